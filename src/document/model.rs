//! CWL document types: the parsed shape of a Workflow / CommandLineTool /
//! ExpressionTool, independent of how it reached us (YAML or JSON).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::Value;

/// Supported `cwlVersion` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CwlVersion {
    #[serde(rename = "v1.0")]
    V1_0,
    #[serde(rename = "v1.1")]
    V1_1,
    #[serde(rename = "v1.2")]
    V1_2,
}

impl CwlVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v1.0" => Some(Self::V1_0),
            "v1.1" => Some(Self::V1_1),
            "v1.2" => Some(Self::V1_2),
            _ => None,
        }
    }
}

impl std::fmt::Display for CwlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CwlVersion::V1_0 => "v1.0",
            CwlVersion::V1_1 => "v1.1",
            CwlVersion::V1_2 => "v1.2",
        };
        write!(f, "{}", s)
    }
}

/// The top-level `class` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentClass {
    Workflow,
    CommandLineTool,
    ExpressionTool,
}

/// A parsed CWL document: one of Workflow / CommandLineTool / ExpressionTool.
///
/// We keep a single struct with an optional `steps`/`base_command`/
/// `expression` rather than an enum-per-class because requirements, hints,
/// inputs, and outputs are shared across all three classes and the analyzer
/// / command builder both need to read them uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub cwl_version: CwlVersion,
    pub class: DocumentClass,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub hints: Vec<Requirement>,
    #[serde(default)]
    pub inputs: Vec<ParamSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Workflow-only.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    /// CommandLineTool-only.
    #[serde(default)]
    pub base_command: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    #[serde(default)]
    pub success_codes: Vec<i32>,

    /// ExpressionTool-only: a `$(...)`/`${...}` expression producing outputs.
    pub expression: Option<String>,

    /// Content hash of the canonical serialized document, `sha256:<hex>`.
    /// Populated by the parser, not present in source documents.
    #[serde(skip_deserializing, default)]
    pub content_hash: Option<String>,
}

impl Document {
    pub fn is_workflow(&self) -> bool {
        self.class == DocumentClass::Workflow
    }

    pub fn is_expression_tool(&self) -> bool {
        self.class == DocumentClass::ExpressionTool
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn output(&self, id: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn input(&self, id: &str) -> Option<&ParamSpec> {
        self.inputs.iter().find(|i| i.id == id)
    }
}

/// A requirement or hint: `DockerRequirement`, `ResourceRequirement`, etc.
/// `class` is the requirement's CWL class name; `fields` captures whatever
/// scalar/string fields it carries (coresMin, ramMin, dockerPull, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub class: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Requirement {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn is_docker(&self) -> bool {
        self.class == "DockerRequirement"
    }

    pub fn is_apptainer(&self) -> bool {
        self.class == "ApptainerRequirement" || self.class == "SingularityRequirement"
    }

    pub fn is_cuda(&self) -> bool {
        self.class == "CUDARequirement"
    }

    pub fn is_resource(&self) -> bool {
        self.class == "ResourceRequirement"
    }

    pub fn cores_min(&self) -> Option<f64> {
        self.field("coresMin").and_then(Value::as_f64)
    }

    pub fn ram_min(&self) -> Option<f64> {
        self.field("ramMin").and_then(Value::as_f64)
    }
}

/// An input/output parameter declaration (`inputs:` entries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub type_spec: String,
    pub default: Option<Value>,
    #[serde(rename = "inputBinding")]
    pub input_binding: Option<InputBinding>,
    /// Secondary file patterns, e.g. `[".bai"]` or `["^.bai"]`.
    #[serde(rename = "secondaryFiles", default)]
    pub secondary_files: Vec<String>,
}

/// An output parameter declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub type_spec: String,
    /// For CommandLineTool outputs: the glob pattern(s) used to collect files.
    #[serde(rename = "outputBinding", default)]
    pub output_binding: Option<OutputBinding>,
    /// For Workflow outputs: `stepId/outputId`.
    #[serde(rename = "outputSource", default)]
    pub output_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBinding {
    #[serde(default)]
    pub glob: Vec<String>,
}

/// `inputBinding` on a CommandLineTool input parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputBinding {
    #[serde(default)]
    pub position: i64,
    pub prefix: Option<String>,
    #[serde(default = "default_true")]
    pub separate: bool,
    #[serde(rename = "itemSeparator")]
    pub item_separator: Option<String>,
    #[serde(rename = "valueFrom")]
    pub value_from: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A `baseCommand`-following positional argument entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default)]
    pub position: i64,
    pub prefix: Option<String>,
    #[serde(default = "default_true")]
    pub separate: bool,
    #[serde(rename = "valueFrom")]
    pub value_from: Option<String>,
}

/// A `steps:` entry in a Workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    /// Path to the referenced document (tool or nested workflow), or an
    /// inline document embedded at `run`.
    pub run: RunRef,
    #[serde(rename = "in", default)]
    pub inputs: Vec<StepInput>,
    #[serde(default)]
    pub out: Vec<String>,
    pub scatter: Option<ScatterSpec>,
    #[serde(rename = "scatterMethod")]
    pub scatter_method: Option<ScatterMethod>,
    pub when: Option<String>,
}

/// `run:` may be a string path or an inline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunRef {
    Path(String),
    Inline(Box<Document>),
}

/// `scatter:` may name one input or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScatterSpec {
    Single(String),
    Multiple(Vec<String>),
}

impl ScatterSpec {
    pub fn names(&self) -> Vec<&str> {
        match self {
            ScatterSpec::Single(s) => vec![s.as_str()],
            ScatterSpec::Multiple(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScatterMethod {
    Dotproduct,
    FlatCrossproduct,
    NestedCrossproduct,
}

/// A single `in:` entry on a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    pub id: String,
    /// `source:` — a workflow input name, or `stepId/outputId`, or a list
    /// of sources when `linkMerge` applies (see Open Questions in DESIGN.md).
    #[serde(default)]
    pub source: Vec<String>,
    pub default: Option<Value>,
    #[serde(rename = "valueFrom")]
    pub value_from: Option<String>,
}

/// A fully-resolved File object, used once a Value is known to carry
/// `class: File` — convenience accessors on top of the raw `Value::Map`.
pub struct FileObject<'a>(pub &'a Value);

impl<'a> FileObject<'a> {
    pub fn path(&self) -> Option<&str> {
        self.0.map_get("path").and_then(Value::as_str)
    }

    pub fn location(&self) -> Option<&str> {
        self.0.map_get("location").and_then(Value::as_str)
    }

    pub fn basename(&self) -> Option<String> {
        if let Some(b) = self.0.map_get("basename").and_then(Value::as_str) {
            return Some(b.to_string());
        }
        self.path()
            .or_else(|| self.location())
            .and_then(|p| p.rsplit('/').next())
            .map(str::to_string)
    }

    pub fn nameroot(&self) -> Option<String> {
        let basename = self.basename()?;
        Some(match basename.rfind('.') {
            Some(0) | None => basename,
            Some(i) => basename[..i].to_string(),
        })
    }

    pub fn nameext(&self) -> Option<String> {
        let basename = self.basename()?;
        match basename.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(basename[i..].to_string()),
        }
    }
}
