//! Task-local builder handed to a task's build closure, and the actions it
//! accepts.

use baseplate_core::{
    PostWriteCommand, ProviderError, ProviderMap, ProviderToken, TaskId, TemplateMetadata,
    VirtualFile, WriteOptions,
};
use serde::Serialize;

use crate::error::GeneratorError;
use crate::template::{render_template, TemplateFile};

/// Read-only options a build step may consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    /// Record template provenance on files rendered from templates.
    pub include_template_metadata: bool,
}

/// A write intent a build step hands to [`TaskBuilder::apply`].
#[derive(Debug, Clone)]
pub enum Action {
    WriteFile(VirtualFile),
    Template(TemplateFile),
    Command(PostWriteCommand),
}

impl Action {
    pub fn write_file(
        id: impl Into<baseplate_core::FileId>,
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        Action::WriteFile(VirtualFile::new(id, path, contents))
    }

    /// Render `source` with tera into `path`. The template is named after the
    /// destination path.
    pub fn template<C: Serialize>(
        id: impl Into<baseplate_core::FileId>,
        path: impl Into<String>,
        source: impl Into<String>,
        context: &C,
    ) -> Result<Self, GeneratorError> {
        Ok(Action::Template(TemplateFile::new(id, path, source).with_context(context)?))
    }

    pub fn command(command: PostWriteCommand) -> Self {
        Action::Command(command)
    }
}

/// Collects one task's files and commands during its build step.
#[derive(Debug)]
pub struct TaskBuilder {
    task_id: TaskId,
    metadata_options: MetadataOptions,
    outputs: ProviderMap,
    files: Vec<VirtualFile>,
    commands: Vec<PostWriteCommand>,
}

impl TaskBuilder {
    pub(crate) fn new(task_id: TaskId, metadata_options: MetadataOptions, outputs: ProviderMap) -> Self {
        Self {
            task_id,
            metadata_options,
            outputs,
            files: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn metadata_options(&self) -> &MetadataOptions {
        &self.metadata_options
    }

    /// Output provider of an upstream task, if one was resolved.
    pub fn output<T: 'static>(&self, token: &ProviderToken<T>) -> Option<&T> {
        self.outputs.get(token)
    }

    pub fn require_output<T: 'static>(&self, token: &ProviderToken<T>) -> Result<&T, ProviderError> {
        self.outputs.require(token)
    }

    pub fn write_file(&mut self, file: VirtualFile) {
        self.files.push(file);
    }

    pub fn add_post_write_command(&mut self, command: PostWriteCommand) {
        self.commands.push(command);
    }

    /// Apply actions in order. Templates are rendered immediately so a broken
    /// template fails the build step that emitted it.
    pub fn apply<I>(&mut self, actions: I) -> Result<(), GeneratorError>
    where
        I: IntoIterator<Item = Action>,
    {
        for action in actions {
            match action {
                Action::WriteFile(file) => self.write_file(file),
                Action::Command(command) => self.add_post_write_command(command),
                Action::Template(template) => {
                    let contents = render_template(&template)?;
                    let metadata = self.metadata_options.include_template_metadata.then(|| {
                        TemplateMetadata {
                            name: template.name.clone(),
                            generator: self.task_id.to_string(),
                        }
                    });
                    let options = WriteOptions {
                        template: metadata,
                        ..template.options
                    };
                    self.write_file(
                        VirtualFile::new(template.id, template.destination, contents)
                            .with_options(options),
                    );
                }
            }
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<VirtualFile>, Vec<PostWriteCommand>) {
        (self.files, self.commands)
    }
}
