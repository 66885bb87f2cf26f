pub mod annotations;
pub mod builder;
pub mod calls;
pub mod file_collect;
pub mod ir;
pub mod language;
pub mod languages;
pub mod parser;
pub mod resolve;
pub mod text_processor;

pub use builder::{EntityBuilder, PackageRegistry, ParseResult};
pub use file_collect::{
    collect_source_files, collect_source_files_with_config, FileCollectionConfig,
};
pub use ir::*;
pub use language::*;
pub use languages::*;
pub use parser::*;
pub use resolve::TypeResolver;
