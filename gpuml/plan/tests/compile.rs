use gpuml_model::*;
use gpuml_plan::*;
use gpuml_quant::{QuantScheme, QuantizedTensor};

fn toy(arch: ArchitectureTag, scheme: QuantScheme) -> Model {
    ToyModelSpec::new(arch, scheme)
        .model(&LoadOptions::default())
        .unwrap()
}

fn plan_for(model: &Model, policy: &GridPolicy) -> PlanResult<ExecutionPlan> {
    let state = model.new_state();
    compile(
        &model.descriptor,
        &model.config,
        &model.weights,
        &state,
        policy,
    )
}

fn names(graph: &TaskGraph) -> Vec<&str> {
    graph.tasks().iter().map(|t| t.name.as_str()).collect()
}

#[test]
fn q8_toy_compiles_to_layer_and_logits_graphs() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.dim = 256;
    spec.hidden_dim = 512;
    spec.n_heads = 8;
    spec.n_kv_heads = 4;
    let model = spec.model(&LoadOptions::default()).unwrap();
    let policy = GridPolicy::default();
    let plan = plan_for(&model, &policy).unwrap();

    let graph_names: Vec<&str> = plan.graphs().iter().map(TaskGraph::name).collect();
    assert_eq!(graph_names, vec!["layer-0", "layer-1", "logits"]);
    assert_eq!(plan.arch(), ArchitectureTag::Llama);
    assert_eq!(plan.scheme(), QuantScheme::Q8_0);
    assert_eq!(plan.layer_graphs().len(), 2);

    // Every kernel of every graph has exactly one grid
    assert_eq!(plan.schedule().len(), plan.kernel_count());
    for graph in plan.graphs() {
        for task in graph.tasks() {
            assert!(
                plan.schedule().get(graph.name(), &task.name).is_some(),
                "no grid for {}.{}",
                graph.name(),
                task.name
            );
        }
    }

    assert_eq!(plan.graph("layer-0").unwrap().dependency(), None);
    assert_eq!(plan.graph("layer-1").unwrap().dependency(), Some("layer-0"));
    assert_eq!(plan.logits().unwrap().dependency(), Some("layer-1"));

    let q = plan.schedule().get("layer-0", "q-proj").unwrap();
    assert_eq!(q.global()[0], 256 * policy.projection_local);
    assert_eq!(q.local()[0], policy.projection_local);
}

#[test]
fn llama_layer_kernel_order() {
    let plan = plan_for(
        &toy(ArchitectureTag::Llama, QuantScheme::F32),
        &GridPolicy::default(),
    )
    .unwrap();
    assert_eq!(
        names(&plan.graphs()[0]),
        vec![
            "attn-rms-reduce",
            "attn-rms-apply",
            "q-proj",
            "k-proj",
            "v-proj",
            "rope-rotate",
            "kv-cache-write",
            "attention",
            "out-proj-residual",
            "ffn-rms-reduce",
            "ffn-rms-apply",
            "gate-proj",
            "up-proj",
            "silu-gate",
            "down-proj-residual",
        ]
    );
    assert_eq!(
        names(plan.logits().unwrap()),
        vec!["final-rms-reduce", "final-rms-apply", "logits-proj"]
    );
}

#[test]
fn structural_variants_change_the_layer_graph() {
    let policy = GridPolicy::default();

    let phi = plan_for(&toy(ArchitectureTag::Phi3, QuantScheme::F16), &policy).unwrap();
    let layer = names(&phi.graphs()[0]);
    assert!(layer.contains(&"qkv-proj") && layer.contains(&"qkv-split"));
    assert!(layer.contains(&"gate-up-proj"));
    assert!(!layer.contains(&"q-proj") && !layer.contains(&"gate-proj"));

    let qwen2 = plan_for(&toy(ArchitectureTag::Qwen2, QuantScheme::Q8_0), &policy).unwrap();
    match &qwen2.graphs()[1].task("k-proj").unwrap().op {
        KernelOp::Matmul { bias, .. } => {
            assert_eq!(*bias, Some(WeightRef::layer(1, WeightRole::KBias)))
        }
        other => panic!("expected matmul, got {:?}", other),
    }

    let qwen3 = plan_for(&toy(ArchitectureTag::Qwen3, QuantScheme::Q8_0), &policy).unwrap();
    let layer = names(&qwen3.graphs()[0]);
    let q_norm = layer.iter().position(|n| *n == "q-norm").unwrap();
    let rope = layer.iter().position(|n| *n == "rope-rotate").unwrap();
    assert!(q_norm < rope);
    assert!(layer.contains(&"k-norm"));

    let llama = plan_for(&toy(ArchitectureTag::Llama, QuantScheme::Q8_0), &policy).unwrap();
    match &llama.graphs()[0].task("q-proj").unwrap().op {
        KernelOp::Matmul { bias, .. } => assert!(bias.is_none()),
        other => panic!("expected matmul, got {:?}", other),
    }
}

#[test]
fn transfers_follow_the_resident_chain() {
    let model = toy(ArchitectureTag::Llama, QuantScheme::Q8_0);
    let plan = plan_for(&model, &GridPolicy::default()).unwrap();
    let x = BufferId::State(StateBuffer::X);
    let pos = BufferId::State(StateBuffer::Position);
    let cos = BufferId::Weight(WeightRef::shared(WeightRole::RopeCos));

    let l0 = &plan.graphs()[0];
    assert_eq!(l0.upload_every(), &[x, pos]);
    assert!(!l0.upload_once().contains(&x));
    assert!(l0.upload_once().contains(&cos));
    assert!(l0
        .upload_once()
        .contains(&BufferId::Weight(WeightRef::layer(0, WeightRole::Q))));
    assert!(!l0
        .upload_once()
        .contains(&BufferId::Weight(WeightRef::layer(1, WeightRole::Q))));
    assert!(l0.download().is_empty());

    let l1 = &plan.graphs()[1];
    assert!(l1.upload_every().is_empty());
    assert!(l1.upload_once().iter().all(|b| matches!(
        b,
        BufferId::Weight(WeightRef { layer: Some(1), .. })
    )));
    let handle = l1.consumes().unwrap();
    assert_eq!(handle.producer(), "layer-0");
    assert!(handle.buffers().contains(&x));
    assert!(handle.buffers().contains(&cos));

    let logits = plan.logits().unwrap();
    assert_eq!(logits.download(), &[BufferId::State(StateBuffer::Logits)]);
    assert!(logits
        .upload_once()
        .contains(&BufferId::Weight(WeightRef::shared(WeightRole::Output))));
    // State stays resident for the next step's layer-0
    assert!(logits.persist().contains(&BufferId::State(StateBuffer::KeyCache)));
}

#[test]
fn tied_output_projects_with_embedding_scheme() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.tied_output = true;
    let model = spec.model(&LoadOptions::default()).unwrap();
    let plan = plan_for(&model, &GridPolicy::default()).unwrap();
    match &plan.logits().unwrap().task("logits-proj").unwrap().op {
        KernelOp::Matmul { scheme, rows, .. } => {
            assert_eq!(*scheme, QuantScheme::F32);
            assert_eq!(*rows, 48);
        }
        other => panic!("expected matmul, got {:?}", other),
    }
}

#[test]
fn every_grid_divides_for_every_family_and_vendor() {
    let registry = CapabilityRegistry::standard();
    for (arch, scheme) in registry.pairs() {
        let model = toy(arch, scheme);
        for vendor in DeviceVendor::ALL {
            let plan = plan_for(&model, &GridPolicy::for_vendor(vendor)).unwrap();
            for (key, grid) in plan.schedule().iter() {
                let (g, l) = (grid.global(), grid.local());
                assert!(
                    g[0] % l[0] == 0 && g[1] % l[1] == 0,
                    "{} {}/{} {}: {}",
                    arch,
                    scheme,
                    vendor.name(),
                    key,
                    grid
                );
            }
        }
    }
}

#[test]
fn compile_is_deterministic() {
    let model = toy(ArchitectureTag::Mistral, QuantScheme::F16);
    let policy = GridPolicy::for_vendor(DeviceVendor::Amd);
    assert_eq!(
        plan_for(&model, &policy).unwrap(),
        plan_for(&model, &policy).unwrap()
    );
}

#[test]
fn unregistered_pair_is_refused() {
    let model = toy(ArchitectureTag::Qwen2, QuantScheme::F32);
    let err = plan_for(&model, &GridPolicy::default()).unwrap_err();
    assert!(matches!(err, PlanError::Unregistered { .. }), "{}", err);
}

#[test]
fn planner_scheme_must_match_weights() {
    let model = toy(ArchitectureTag::Llama, QuantScheme::Q8_0);
    let state = model.new_state();
    let err = CapabilityRegistry::standard()
        .planner(model.descriptor, QuantScheme::F16)
        .unwrap()
        .validate(&model.config, &model.weights, &state)
        .unwrap_err();
    match err {
        PlanError::SchemeMismatch { expected, actual } => {
            assert_eq!(expected, "F16");
            assert_eq!(actual, "Q8_0");
        }
        other => panic!("expected SchemeMismatch, got {}", other),
    }
}

#[test]
fn output_scheme_must_tile_the_embedding_width() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::F16);
    spec.dim = 48;
    let model = spec.model(&LoadOptions::default()).unwrap();
    let mut weights = (*model.weights).clone();
    let rows = vec![0.25f32; model.config.vocab_size * model.config.dim];
    weights.output = Some(QuantizedTensor::from_f32(&rows, QuantScheme::Q8_0).unwrap());

    let err = compile(
        &model.descriptor,
        &model.config,
        &weights,
        &model.new_state(),
        &GridPolicy::default(),
    )
    .unwrap_err();
    match err {
        PlanError::Model(ModelError::InvalidConfig(msg)) => {
            assert!(msg.contains("output.weight"), "{}", msg)
        }
        other => panic!("expected InvalidConfig, got {}", other),
    }
}

#[test]
fn state_for_another_context_is_refused() {
    let model = toy(ArchitectureTag::Llama, QuantScheme::Q8_0);
    let short = model.config.clone().with_max_context(Some(16));
    let state = RuntimeState::new(&short, &model.descriptor);
    let err = compile(
        &model.descriptor,
        &model.config,
        &model.weights,
        &state,
        &GridPolicy::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Consistency(_)), "{}", err);
}

#[test]
fn state_missing_fused_buffers_is_refused() {
    let model = toy(ArchitectureTag::Phi3, QuantScheme::Q8_0);
    let llama = ArchitectureDescriptor::for_tag(ArchitectureTag::Llama);
    let state = RuntimeState::new(&model.config, &llama);
    let err = compile(
        &model.descriptor,
        &model.config,
        &model.weights,
        &state,
        &GridPolicy::default(),
    )
    .unwrap_err();
    match err {
        PlanError::MissingBuffer { graph, buffer, .. } => {
            assert_eq!(graph, "layer-0");
            assert_eq!(buffer, "qkv");
        }
        other => panic!("expected MissingBuffer, got {}", other),
    }
}

#[test]
fn layers_must_be_built_in_order() {
    let model = toy(ArchitectureTag::Llama, QuantScheme::Q8_0);
    let state = model.new_state();
    let planner = CapabilityRegistry::standard()
        .planner(model.descriptor, QuantScheme::Q8_0)
        .unwrap()
        .validate(&model.config, &model.weights, &state)
        .unwrap();

    assert!(matches!(
        planner.build_layer(1, None),
        Err(PlanError::Consistency(_))
    ));
    let (_, h0) = planner.build_layer(0, None).unwrap();
    assert!(matches!(
        planner.build_layer(0, Some(h0.clone())),
        Err(PlanError::Consistency(_))
    ));
    // Logits must consume the last layer, not layer-0
    assert!(matches!(
        planner.build_logits(h0.clone()),
        Err(PlanError::Consistency(_))
    ));
    let (_, h1) = planner.build_layer(1, Some(h0)).unwrap();
    assert!(matches!(
        planner.build_layer(2, Some(h1.clone())),
        Err(PlanError::Consistency(_))
    ));
    let logits = planner.build_logits(h1).unwrap();
    assert_eq!(logits.dependency(), Some("layer-1"));
}
