//! Composable generator bundles.

use baseplate_core::ExportScope;

use crate::task::GeneratorTask;

/// A node in the generator tree.
///
/// `directory` is joined onto the parent's directory and becomes the
/// [`TaskContext::directory`](crate::TaskContext) of the bundle's tasks.
/// `scopes` are the export scopes this bundle opens for its subtree.
#[derive(Debug, Clone)]
pub struct GeneratorBundle {
    pub name: String,
    pub directory: Option<String>,
    pub scopes: Vec<ExportScope>,
    pub children: Vec<GeneratorBundle>,
    pub tasks: Vec<GeneratorTask>,
}

impl GeneratorBundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: None,
            scopes: Vec::new(),
            children: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn scope(mut self, scope: ExportScope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn child(mut self, child: GeneratorBundle) -> Self {
        self.children.push(child);
        self
    }

    pub fn task(mut self, task: GeneratorTask) -> Self {
        self.tasks.push(task);
        self
    }
}
