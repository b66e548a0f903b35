//! CWL document model and parser (C1).

pub mod model;
pub mod parse;

pub use model::{
    Argument, CwlVersion, Document, DocumentClass, FileObject, InputBinding, OutputBinding,
    OutputSpec, ParamSpec, Requirement, RunRef, ScatterMethod, ScatterSpec, StepInput,
    WorkflowStep,
};
pub use parse::{content_hash, parse_document};
