//! Capability catalogue: the closed set of operations the model may invoke.
//!
//! [`CapabilityKind`] is the single source of truth for names, descriptions and
//! parameter shapes. The declarations advertised to the model and the argument
//! parsing used by the dispatcher are both derived from it, and dispatch matches
//! exhaustively on [`Capability`], so the two cannot drift apart.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::types::Invocation;

/// Bumped whenever a capability name, description or parameter changes.
pub const CATALOGUE_VERSION: u32 = 1;

/// A named string parameter of a capability. All parameters are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    ListFiles,
    ReadFiles,
    WriteFile,
    DeleteFile,
    UpdateTasks,
    Commit,
}

const PATH_GLOB: ParamSpec = ParamSpec {
    name: "path",
    description: "A file path or glob pattern. Files ignored by .gitignore will be skipped. Examples: 'src/**/*.rs', 'README.md'",
};
const PATH_DIR: ParamSpec = ParamSpec {
    name: "path",
    description: "The directory to search, relative to the root of the repository. Example: 'src/'",
};
const PATH_WRITE: ParamSpec = ParamSpec {
    name: "path",
    description: "The file path to write (relative to the project root). Example: 'src/utils/add.rs'",
};
const CONTENT: ParamSpec = ParamSpec {
    name: "content",
    description: "The content to write into the file",
};
const PATH_DELETE: ParamSpec = ParamSpec {
    name: "path",
    description: "The path to the file to delete (relative to the project root). Example: 'src/obsolete/module.rs'",
};
const TASKS: ParamSpec = ParamSpec {
    name: "tasks",
    description: "The text to write to the tasks file. Each task should take one line and typically include: an incremental number, a description, and a set of suggested files that should be updated to fulfill the task.",
};
const MESSAGE: ParamSpec = ParamSpec {
    name: "message",
    description: "The commit message. The first line should be a concise title in imperative mood. If helpful, follow with a short paragraph describing the changes in more detail.",
};

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 6] = [
        CapabilityKind::ListFiles,
        CapabilityKind::ReadFiles,
        CapabilityKind::WriteFile,
        CapabilityKind::DeleteFile,
        CapabilityKind::UpdateTasks,
        CapabilityKind::Commit,
    ];

    /// Wire name used by the model service.
    pub fn name(self) -> &'static str {
        match self {
            CapabilityKind::ListFiles => "list_files",
            CapabilityKind::ReadFiles => "read_files",
            CapabilityKind::WriteFile => "write_file",
            CapabilityKind::DeleteFile => "delete_file",
            CapabilityKind::UpdateTasks => "update_tasks",
            CapabilityKind::Commit => "commit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            CapabilityKind::ListFiles => {
                "Recursively lists all files in a directory, excluding any files or folders ignored by .gitignore. Dot-files and dot-directories are skipped unless the path names them explicitly (e.g. '.github/'). Returns paths relative to the project root."
            }
            CapabilityKind::ReadFiles => {
                "Reads the content of one or more source code files using file paths or glob patterns."
            }
            CapabilityKind::WriteFile => {
                "Writes or updates a single file in the codebase. Automatically creates any necessary parent folders."
            }
            CapabilityKind::DeleteFile => {
                "Deletes a file from the codebase. If the file doesn't exist, the operation is silently ignored."
            }
            CapabilityKind::UpdateTasks => {
                "Writes the updated AI tasks list to the dedicated file and clears the User tasks. Run this at least once before the final commit."
            }
            CapabilityKind::Commit => {
                "Finishes the improvement cycle with the provided commit message. Upon calling this function, no more updates will be allowed."
            }
        }
    }

    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            CapabilityKind::ListFiles => &[PATH_DIR],
            CapabilityKind::ReadFiles => &[PATH_GLOB],
            CapabilityKind::WriteFile => &[PATH_WRITE, CONTENT],
            CapabilityKind::DeleteFile => &[PATH_DELETE],
            CapabilityKind::UpdateTasks => &[TASKS],
            CapabilityKind::Commit => &[MESSAGE],
        }
    }

    /// Function declaration in the model service's schema dialect.
    pub fn declaration(self) -> Value {
        let mut properties = Map::new();
        for param in self.params() {
            properties.insert(
                param.name.to_string(),
                json!({ "type": "STRING", "description": param.description }),
            );
        }
        let required: Vec<&str> = self.params().iter().map(|param| param.name).collect();
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "OBJECT",
                "properties": properties,
                "required": required,
            },
        })
    }
}

/// Declarations for every capability, in catalogue order.
pub fn declarations() -> Vec<Value> {
    CapabilityKind::ALL
        .into_iter()
        .map(CapabilityKind::declaration)
        .collect()
}

/// A parsed, well-typed invocation ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    ListFiles { path: String },
    ReadFiles { path: String },
    WriteFile { path: String, content: String },
    DeleteFile { path: String },
    UpdateTasks { tasks: String },
    Commit { message: String },
}

/// Why an invocation could not be turned into a [`Capability`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("unknown capability '{name}'")]
    UnknownCapability { name: String },
    #[error("{capability}: missing required argument '{argument}'")]
    MissingArgument {
        capability: &'static str,
        argument: &'static str,
    },
    #[error("{capability}: argument '{argument}' must be a string")]
    InvalidArgument {
        capability: &'static str,
        argument: &'static str,
    },
}

impl Capability {
    pub fn parse(invocation: &Invocation) -> Result<Self, InvocationError> {
        let kind = CapabilityKind::from_name(&invocation.name).ok_or_else(|| {
            InvocationError::UnknownCapability {
                name: invocation.name.clone(),
            }
        })?;
        let args = Args {
            kind,
            values: invocation.arguments.as_object(),
        };
        let capability = match kind {
            CapabilityKind::ListFiles => Capability::ListFiles {
                path: args.string(PATH_DIR)?,
            },
            CapabilityKind::ReadFiles => Capability::ReadFiles {
                path: args.string(PATH_GLOB)?,
            },
            CapabilityKind::WriteFile => Capability::WriteFile {
                path: args.string(PATH_WRITE)?,
                content: args.string(CONTENT)?,
            },
            CapabilityKind::DeleteFile => Capability::DeleteFile {
                path: args.string(PATH_DELETE)?,
            },
            CapabilityKind::UpdateTasks => Capability::UpdateTasks {
                tasks: args.string(TASKS)?,
            },
            CapabilityKind::Commit => Capability::Commit {
                message: args.string(MESSAGE)?,
            },
        };
        Ok(capability)
    }

}

struct Args<'a> {
    kind: CapabilityKind,
    values: Option<&'a Map<String, Value>>,
}

impl Args<'_> {
    fn string(&self, param: ParamSpec) -> Result<String, InvocationError> {
        debug_assert!(self.kind.params().contains(&param));
        let value = self
            .values
            .and_then(|values| values.get(param.name))
            .ok_or(InvocationError::MissingArgument {
                capability: self.kind.name(),
                argument: param.name,
            })?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or(InvocationError::InvalidArgument {
                capability: self.kind.name(),
                argument: param.name,
            })
    }
}
