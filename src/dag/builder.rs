//! DAG builder (C7): turns a validated Workflow document plus its run
//! inputs into a [`Dag`] of one-node-per-(step, scatter instance).

use std::collections::{BTreeMap, HashMap};

use super::node::{node_id, Node};
use super::node::NodeStatus;
use super::runtime::Dag;
use crate::analyzer::{self, Dependency};
use crate::document::{Document, ScatterMethod, WorkflowStep};
use crate::error::{WorkflowError, WorkflowResult};
use crate::scatter::{expand_scatter, ScatterIndex};
use crate::value::Value;

/// Builds the DAG for one workflow run. `loader` resolves a step's `run:`
/// path reference to its document; `workflow_inputs` are the run's
/// top-level input values, used to determine scatter array lengths.
pub fn build_dag<F>(
    workflow: &Document,
    workflow_inputs: &BTreeMap<String, Value>,
    mut loader: F,
) -> WorkflowResult<Dag>
where
    F: FnMut(&str) -> WorkflowResult<Document>,
{
    analyzer::validate_workflow(workflow)?;

    let dependencies = analyzer::extract_dependencies(workflow);
    let dag = Dag::new();

    // step_id -> list of node ids emitted for it (1 unless scattered).
    let mut instances: HashMap<String, Vec<ScatterIndex>> = HashMap::new();
    let mut built_nodes: HashMap<String, Node> = HashMap::new();

    for step in &workflow.steps {
        let tool = analyzer::resolve_run(&step.run, |p| loader(p))?;
        let scatter_indices = match (&step.scatter, &step.scatter_method) {
            (Some(spec), method) => {
                let method = method.as_ref().copied().unwrap_or(ScatterMethod::Dotproduct);
                let lengths = scatter_lengths(step, spec.names().as_slice(), workflow_inputs)?;
                expand_scatter(method, &lengths)?
            }
            (None, _) => vec![vec![]],
        };
        instances.insert(step.id.clone(), scatter_indices.clone());

        for scatter_index in scatter_indices {
            let node = Node::new(step.clone(), tool.clone(), scatter_index);
            built_nodes.insert(node.id.clone(), node);
        }
    }

    let (deps_by_consumer, deps_by_producer) = compute_edges(&dependencies, &instances);
    for (id, mut node) in built_nodes {
        node.dependencies = deps_by_consumer.get(&id).cloned().unwrap_or_default();
        node.dependents = deps_by_producer.get(&id).cloned().unwrap_or_default();
        dag.add_node(node);
    }

    initialize_ready_set(&dag);

    Ok(dag)
}

/// Resolves the array length of each scattered input, pulling from resolved
/// workflow inputs when the source is a bare workflow input and erroring
/// (scatter over upstream step outputs is resolved once the DAG is being
/// built, not before step outputs exist) when it cannot be determined
/// statically.
fn scatter_lengths(
    step: &WorkflowStep,
    scatter_names: &[&str],
    workflow_inputs: &BTreeMap<String, Value>,
) -> WorkflowResult<Vec<usize>> {
    let mut lengths = Vec::with_capacity(scatter_names.len());
    for name in scatter_names {
        let input = step
            .inputs
            .iter()
            .find(|i| i.id == *name)
            .ok_or_else(|| WorkflowError::InvalidRun(format!("scatter input {} not found on step {}", name, step.id)))?;
        let len = scatter_input_length(input, workflow_inputs)?;
        lengths.push(len);
    }
    Ok(lengths)
}

fn scatter_input_length(
    input: &crate::document::StepInput,
    workflow_inputs: &BTreeMap<String, Value>,
) -> WorkflowResult<usize> {
    for source in &input.source {
        let (dep_step, output) = analyzer::parse_source_ref(source);
        if dep_step.is_none() {
            if let Some(Value::List(items)) = workflow_inputs.get(&output) {
                return Ok(items.len());
            }
        }
    }
    // Source is an upstream step output: length is only known once that
    // step has produced its array, which `prepare_node_inputs` handles at
    // dispatch time for gather; for scatter-over-step-output the length is
    // still required at build time, so this is a genuine build-time error
    // in the absence of a static input array.
    Err(WorkflowError::InvalidRun(format!(
        "cannot determine scatter length for input {} statically; scattering over an upstream step's output requires that step to run first",
        input.id
    )))
}

/// Computes, for every node id, the list of producer node ids it depends on
/// and the list of consumer node ids that depend on it. A step's dependency
/// is linked to *every* instance emitted for the scattered dependency — one
/// consumer node waits on all producer instances; gathering the resulting
/// array happens at input-prep time, not here.
fn compute_edges(
    dependencies: &[Dependency],
    instances: &HashMap<String, Vec<ScatterIndex>>,
) -> (HashMap<String, Vec<String>>, HashMap<String, Vec<String>>) {
    let mut by_consumer: HashMap<String, Vec<String>> = HashMap::new();
    let mut by_producer: HashMap<String, Vec<String>> = HashMap::new();
    for dep in dependencies {
        let Some(dep_step) = &dep.depends_on_step else { continue };
        let Some(dep_instances) = instances.get(dep_step) else { continue };
        let Some(consumer_instances) = instances.get(&dep.step) else { continue };
        for consumer_idx in consumer_instances {
            let consumer_id = node_id(&dep.step, consumer_idx);
            for producer_idx in dep_instances {
                let producer_id = node_id(dep_step, producer_idx);
                by_consumer.entry(consumer_id.clone()).or_default().push(producer_id.clone());
                by_producer.entry(producer_id).or_default().push(consumer_id.clone());
            }
        }
    }
    (by_consumer, by_producer)
}

fn initialize_ready_set(dag: &Dag) {
    for node in dag.all_nodes() {
        if node.dependencies.is_empty() {
            let _ = node.transition(NodeStatus::Ready);
        }
    }
}

/// Resolves a node's `in:` bindings into concrete input values, pulling
/// from completed upstream node outputs (symbolic `stepId/outputId`
/// sources) or from the run's top-level inputs (bare sources). For a
/// consumer that is not itself scattered over a given scattered
/// dependency, all of that dependency's instance outputs are gathered into
/// an array, ordered by scatter index, per the dependency's scatter
/// method (flat for `dotproduct`/`flat_crossproduct`, nested for
/// `nested_crossproduct`).
pub fn prepare_node_inputs(
    dag: &Dag,
    node: &Node,
    workflow_inputs: &BTreeMap<String, Value>,
) -> WorkflowResult<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();
    for input in &node.step.inputs {
        if let Some(value_from) = &input.value_from {
            resolved.insert(input.id.clone(), Value::Str(value_from.clone()));
            continue;
        }
        let mut gathered: Vec<Value> = Vec::new();
        let mut single: Option<Value> = None;
        for source in &input.source {
            let (dep_step, output) = analyzer::parse_source_ref(source);
            match dep_step {
                None => {
                    if let Some(v) = workflow_inputs.get(&output) {
                        single = Some(v.clone());
                    }
                }
                Some(dep_step) => {
                    let producer_nodes = producer_instances(dag, &dep_step, &node.scatter_index);
                    if producer_nodes.len() == 1 {
                        single = producer_nodes[0].outputs().get(&output).cloned();
                    } else {
                        for producer in &producer_nodes {
                            let value = match producer.status() {
                                NodeStatus::Skipped => Value::Null,
                                _ => producer.outputs().get(&output).cloned().unwrap_or(Value::Null),
                            };
                            gathered.push(value);
                        }
                    }
                }
            }
        }
        let value = if !gathered.is_empty() {
            Value::List(gathered)
        } else if let Some(v) = single {
            v
        } else if let Some(default) = &input.default {
            default.clone()
        } else {
            Value::Null
        };
        resolved.insert(input.id.clone(), value);
    }
    Ok(resolved)
}

/// All node instances for `dep_step`. When the consuming node is itself one
/// instance of a step scattered over `dep_step` via `dotproduct`, only the
/// matching instance is returned (1:1 zip); otherwise every instance is
/// returned for gathering.
fn producer_instances(dag: &Dag, dep_step: &str, _consumer_scatter_index: &ScatterIndex) -> Vec<std::sync::Arc<Node>> {
    let mut nodes: Vec<_> = dag
        .all_nodes()
        .into_iter()
        .filter(|n| n.step_id == dep_step)
        .collect();
    nodes.sort_by(|a, b| a.scatter_index.cmp(&b.scatter_index));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    fn tool_doc() -> Document {
        parse_document(
            r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: [true]
inputs:
  - id: in
    type: File
outputs:
  - id: out
    type: File
    outputBinding: { glob: ["*.txt"] }
"#,
        )
        .unwrap()
    }

    fn two_step_workflow() -> Document {
        parse_document(
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: infile
    type: File
outputs:
  - id: result
    type: File
    outputSource: b/out
steps:
  - id: a
    run: a.cwl
    in:
      - id: in
        source: [infile]
    out: [out]
  - id: b
    run: b.cwl
    in:
      - id: in
        source: [a/out]
    out: [out]
"#,
        )
        .unwrap()
    }

    fn file_value(path: &str) -> Value {
        let mut m = BTreeMap::new();
        m.insert("class".to_string(), Value::Str("File".into()));
        m.insert("path".to_string(), Value::Str(path.into()));
        Value::Map(m)
    }

    #[test]
    fn s1_two_node_pipeline_ready_propagation() {
        let workflow = two_step_workflow();
        let mut inputs = BTreeMap::new();
        inputs.insert("infile".to_string(), file_value("/tmp/in.txt"));

        let dag = build_dag(&workflow, &inputs, |_path| Ok(tool_doc())).unwrap();
        assert_eq!(dag.get_node("a").unwrap().status(), NodeStatus::Ready);
        assert_eq!(dag.get_node("b").unwrap().status(), NodeStatus::Pending);

        dag.update_node_status("a", NodeStatus::Running).unwrap();
        dag.get_node("a").unwrap().set_outputs({
            let mut m = BTreeMap::new();
            m.insert("out".to_string(), file_value("/tmp/a.out"));
            m
        });
        dag.update_node_status("a", NodeStatus::Completed).unwrap();

        let ready = dag.get_ready_nodes();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "b");

        let resolved = prepare_node_inputs(&dag, &ready[0], &inputs).unwrap();
        assert_eq!(resolved.get("in"), Some(&file_value("/tmp/a.out")));
    }

    #[test]
    fn s2_scatter_dotproduct_emits_one_node_per_tuple() {
        let workflow = parse_document(
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: files
    type: File[]
  - id: tags
    type: string[]
outputs: []
steps:
  - id: s
    run: tool.cwl
    scatter: [files, tags]
    scatterMethod: dotproduct
    in:
      - id: in
        source: [files]
      - id: tag
        source: [tags]
    out: [out]
"#,
        )
        .unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "files".to_string(),
            Value::List(vec![file_value("/f1"), file_value("/f2"), file_value("/f3")]),
        );
        inputs.insert(
            "tags".to_string(),
            Value::List(vec!["a".into(), "b".into(), "c".into()]),
        );

        let dag = build_dag(&workflow, &inputs, |_| Ok(tool_doc())).unwrap();
        assert_eq!(dag.len(), 3);
        assert!(dag.get_node("s/0").is_some());
        assert!(dag.get_node("s/1").is_some());
        assert!(dag.get_node("s/2").is_some());
    }

    #[test]
    fn s2_scatter_mismatched_lengths_fails_at_build() {
        let workflow = parse_document(
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: files
    type: File[]
  - id: tags
    type: string[]
outputs: []
steps:
  - id: s
    run: tool.cwl
    scatter: [files, tags]
    scatterMethod: dotproduct
    in:
      - id: in
        source: [files]
      - id: tag
        source: [tags]
    out: [out]
"#,
        )
        .unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "files".to_string(),
            Value::List(vec![file_value("/f1"), file_value("/f2"), file_value("/f3")]),
        );
        inputs.insert("tags".to_string(), Value::List(vec!["a".into(), "b".into()]));

        let err = build_dag(&workflow, &inputs, |_| Ok(tool_doc())).unwrap_err();
        assert!(matches!(err, WorkflowError::ScatterArityMismatch(_)));
    }

    #[test]
    fn s3_cascade_skip_on_failure() {
        let workflow = parse_document(
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: infile
    type: File
outputs: []
steps:
  - id: a
    run: a.cwl
    in:
      - id: in
        source: [infile]
    out: [out]
  - id: b
    run: b.cwl
    in:
      - id: in
        source: [a/out]
    out: [out]
  - id: c
    run: c.cwl
    in:
      - id: in
        source: [b/out]
    out: [out]
"#,
        )
        .unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert("infile".to_string(), file_value("/tmp/in.txt"));

        let dag = build_dag(&workflow, &inputs, |_| Ok(tool_doc())).unwrap();
        dag.update_node_status("a", NodeStatus::Running).unwrap();
        dag.update_node_status("a", NodeStatus::Failed).unwrap();

        assert_eq!(dag.get_node("b").unwrap().status(), NodeStatus::Skipped);
        assert_eq!(dag.get_node("c").unwrap().status(), NodeStatus::Skipped);
        assert!(dag.get_node("b").unwrap().task_id().is_none());
        assert!(dag.has_failed());
        assert!(dag.is_complete());
    }
}
