use std::sync::Arc;

use gpuml_gguf::{GGMLType, TensorContainer};
use gpuml_model::*;
use gpuml_quant::QuantScheme;

fn load(spec: &ToyModelSpec) -> ModelResult<Model> {
    spec.model(&LoadOptions::default())
}

#[test]
fn loads_every_family_and_scheme() {
    for arch in ArchitectureTag::ALL {
        for scheme in QuantScheme::ALL {
            let model = load(&ToyModelSpec::new(arch, scheme)).unwrap();
            assert_eq!(model.descriptor.tag, arch);
            assert_eq!(model.weights.scheme, scheme);
            assert_eq!(model.weights.n_layers(), 2);
            assert_eq!(model.config.vocab_size, 48);
            assert_eq!(model.vocabulary.len(), 48);
            // Embeddings always materialize in full precision
            assert_eq!(model.weights.token_embedding.scheme(), QuantScheme::F32);
        }
    }
}

#[test]
fn structural_variants_bind_expected_tensors() {
    let phi = load(&ToyModelSpec::new(ArchitectureTag::Phi3, QuantScheme::F16)).unwrap();
    let l0 = &phi.weights.layers[0];
    assert!(matches!(l0.attention, AttentionWeights::Fused { .. }));
    assert!(matches!(l0.ffn, FfnWeights::Fused { .. }));
    assert!(phi
        .weights
        .matrix(WeightRef::layer(0, WeightRole::GateUp))
        .is_some());
    assert!(phi.weights.matrix(WeightRef::layer(0, WeightRole::Q)).is_none());

    let qwen2 = load(&ToyModelSpec::new(ArchitectureTag::Qwen2, QuantScheme::Q8_0)).unwrap();
    assert_eq!(
        qwen2
            .weights
            .dense(WeightRef::layer(1, WeightRole::KBias))
            .map(|b| b.len()),
        Some(qwen2.config.kv_dim())
    );

    let qwen3 = load(&ToyModelSpec::new(ArchitectureTag::Qwen3, QuantScheme::Q8_0)).unwrap();
    assert_eq!(
        qwen3
            .weights
            .dense(WeightRef::layer(0, WeightRole::QNorm))
            .map(|n| n.len()),
        Some(qwen3.config.head_size)
    );
}

#[test]
fn tied_output_falls_back_to_embedding() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.tied_output = true;
    let model = load(&spec).unwrap();
    assert!(model.weights.is_tied());
    assert_eq!(
        model.weights.output_projection(),
        &model.weights.token_embedding
    );
}

#[test]
fn missing_tensor_is_capability_error() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.omit.push("blk.1.attn_v.weight".into());
    match load(&spec) {
        Err(ModelError::MissingTensor(name)) => assert_eq!(name, "blk.1.attn_v.weight"),
        other => panic!("expected MissingTensor, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn mixed_projection_schemes_rejected() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.overrides
        .push(("blk.1.ffn_up.weight".into(), QuantScheme::F16));
    assert!(matches!(
        load(&spec),
        Err(ModelError::MixedQuantization { tensor, .. }) if tensor == "blk.1.ffn_up.weight"
    ));
}

#[test]
fn output_may_use_its_own_scheme() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.overrides.push(("output.weight".into(), QuantScheme::F16));
    let model = load(&spec).unwrap();
    assert_eq!(model.weights.output_projection().scheme(), QuantScheme::F16);
}

#[test]
fn q8_output_over_partial_block_width_rejected() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::F16);
    spec.dim = 48;
    spec.overrides.push(("output.weight".into(), QuantScheme::Q8_0));
    match load(&spec) {
        Err(ModelError::InvalidConfig(msg)) => assert!(msg.contains("output.weight"), "{}", msg),
        other => panic!("expected InvalidConfig, got {:?}", other.map(|m| m.config)),
    }

    spec.overrides.clear();
    assert!(load(&spec).is_ok());
}

#[test]
fn four_bit_output_rejected() {
    let mut spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::Q8_0);
    spec.tied_output = true;
    let mut b = spec.builder().unwrap();
    let blocks = spec.vocab_size * spec.dim / 32;
    b.add_tensor_raw(
        "output.weight",
        &[spec.dim, spec.vocab_size],
        GGMLType::Q4_0,
        vec![0u8; blocks * 18],
    );
    let container = TensorContainer::from_bytes(b.build()).unwrap();
    assert!(matches!(
        Model::from_container(Arc::new(container), &LoadOptions::default()),
        Err(ModelError::UnsupportedType { tensor, .. }) if tensor == "output.weight"
    ));
}

#[test]
fn wrong_projection_shape_rejected() {
    let spec = ToyModelSpec::new(ArchitectureTag::Llama, QuantScheme::F32);
    let mut bad = spec.clone();
    bad.omit.push("blk.0.attn_k.weight".into());
    let mut b = bad.builder().unwrap();
    // K declared with query width instead of kv width
    b.add_tensor_f32("blk.0.attn_k.weight", &[64, 64], &vec![0.0; 64 * 64]);
    let container = TensorContainer::from_bytes(b.build()).unwrap();
    assert!(matches!(
        Model::from_container(Arc::new(container), &LoadOptions::default()),
        Err(ModelError::ShapeMismatch { tensor, .. }) if tensor == "blk.0.attn_k.weight"
    ));
}

#[test]
fn max_context_shrinks_state_and_rope() {
    let spec = ToyModelSpec::new(ArchitectureTag::Qwen2, QuantScheme::F16);
    let model = spec
        .model(&LoadOptions {
            max_context: Some(8),
        })
        .unwrap();
    assert_eq!(model.config.context_length, 8);
    assert_eq!(model.weights.rope.context_length, 8);
    let state = model.new_state();
    assert_eq!(
        state.len(StateBuffer::KeyCache),
        2 * 8 * model.config.kv_dim()
    );
}

#[test]
fn load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("toy.gguf");
    ToyModelSpec::new(ArchitectureTag::Mistral, QuantScheme::Q8_0)
        .write(&path)
        .unwrap();
    let model = load_model(&path, &LoadOptions::default()).unwrap();
    assert_eq!(model.descriptor.tag, ArchitectureTag::Mistral);
    assert_eq!(model.vocabulary.bos_token_id, Some(1));
}

#[test]
fn unsupported_architecture_rejected() {
    let mut b = gpuml_gguf::GgufBuilder::new();
    b.add_string("general.architecture", "gptneox");
    let container = TensorContainer::from_bytes(b.build()).unwrap();
    assert!(matches!(
        Model::from_container(Arc::new(container), &LoadOptions::default()),
        Err(ModelError::UnsupportedArchitecture(_))
    ));
}
