//! End-to-end surgery on the fixture graphs

use gsurgery_graph::{load, save, AttrValue, DataType, InputRef};
use gsurgery_passes::{
    classify, extract, rewrite, sanitize, AttributeRules, BranchCheck, ExtractError,
    InputSelection, Pipeline, PipelineConfig, RewriteRules, Stage, SurgeryError, Taxonomy,
};
use gsurgery_test_utils::{detector_graph, names, scenario_graph};
use pretty_assertions::assert_eq;

#[test]
fn split_scenario() {
    let graph = scenario_graph();

    let extracted = extract(&graph, &["E"]).unwrap();
    assert_eq!(names(&extracted), vec!["A", "axis", "B", "C", "D", "E"]);

    let rules = RewriteRules::new(["Split"]).with_selection("Split", InputSelection::new(1, 2));
    let outcome = rewrite(&extracted, &rules).unwrap();
    assert_eq!(outcome.rewritten, 1);

    let c = outcome.graph.get("C").unwrap();
    assert_eq!(c.op, "Identity");
    assert_eq!(c.inputs, vec![InputRef::new("B")]);
    assert_eq!(c.get_attr("T"), Some(&AttrValue::Type(DataType::Float32)));

    let taxonomy = Taxonomy::new(["Split"], Vec::<String>::new()).unwrap();
    let report = classify(&outcome.graph, &taxonomy);
    assert!(report.disallowed.is_empty());
    assert!(!report.op_counts.contains_key("Split"));

    // D keeps addressing C by name; slot 1 now reads the single pass-through output
    let d = outcome.graph.get("D").unwrap();
    assert_eq!(d.inputs, vec![InputRef::with_slot("C", 1)]);
    assert!(outcome.graph.validate().is_ok());
}

#[test]
fn extract_missing_output() {
    let err = extract(&scenario_graph(), &["doesNotExist"]).unwrap_err();
    assert_eq!(err, ExtractError::MissingNode("doesNotExist".into()));
}

#[test]
fn detector_report() {
    let report = classify(&detector_graph(), &Taxonomy::vitis_ai());

    let disallowed: Vec<&str> = report.disallowed.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(disallowed, vec!["attn/matmul", "attn/softmax"]);

    let suspicious: Vec<&str> = report.suspicious.iter().map(|o| o.op.as_str()).collect();
    assert_eq!(suspicious, vec!["Split", "ConcatV2", "Reshape"]);

    let hazards: Vec<String> = report.hazards.iter().map(ToString::to_string).collect();
    assert_eq!(
        hazards,
        vec![
            "post/shape: shape introspection via Shape",
            "post/reshape: dynamic shape from Shape",
        ]
    );
    assert_eq!(report.top_ops(2), vec![("Conv2D", 3), ("Identity", 3)]);
}

#[test]
fn detector_pipeline_strips_post_processing() {
    let config = PipelineConfig {
        stages: vec![Stage::Sanitize, Stage::Extract, Stage::Rewrite],
        outputs: vec!["head/conv".into()],
        branch_check: BranchCheck::Warn,
        ..PipelineConfig::default()
    };
    let outcome = Pipeline::new(config).unwrap().run(&detector_graph()).unwrap();

    assert!(outcome.report.is_clean());
    assert!(!outcome.graph.contains("post/reshape"));
    assert_eq!(outcome.stages[0].changed, 6);
    assert_eq!(outcome.rewrites.len(), 4);

    // The concat dropped the bottleneck branch and the matmul its key operand
    let branches = outcome.branches.unwrap();
    let severed: Vec<&str> = branches.severed.iter().map(|b| b.producer.as_str()).collect();
    assert_eq!(severed, vec!["c2f/m0", "attn/k"]);

    // Output is still a valid graph that survives the codec
    let bytes = save(&outcome.graph);
    assert_eq!(load(&bytes).unwrap(), outcome.graph);
    outcome.graph.validate().unwrap();
}

#[test]
fn detector_pipeline_refuses_severed_branch_by_default() {
    let config = PipelineConfig {
        stages: vec![Stage::Extract, Stage::Rewrite],
        outputs: vec!["head/conv".into()],
        ..PipelineConfig::default()
    };
    let err = Pipeline::new(config).unwrap().run(&detector_graph()).unwrap_err();
    assert!(matches!(err, SurgeryError::Rewrite(_)));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn sanitize_then_rewrite_in_either_order() {
    let rules = AttributeRules::tf2_compat();
    let rewrite_rules = RewriteRules::vitis_ai();

    let a = rewrite(&sanitize(&detector_graph(), &rules).graph, &rewrite_rules).unwrap();
    let b = sanitize(&rewrite(&detector_graph(), &rewrite_rules).unwrap().graph, &rules);
    assert_eq!(a.graph, b.graph);
}
