pub(crate) mod module;
mod process;

pub use module::{same_exports, Export, ModuleExports};
pub use process::{process_csf_file, same_csf_files, CsfFile, CsfStory};
