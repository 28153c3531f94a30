use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use gpuml_gguf::TensorContainer;

use crate::api::error::ModelResult;
use crate::api::types::*;
use crate::core::arch::resolve_architecture;

/// Open a container file and assemble the model it holds.
pub fn load_model(path: impl AsRef<Path>, options: &LoadOptions) -> ModelResult<Model> {
    let container = TensorContainer::open(path)?;
    Model::from_container(Arc::new(container), options)
}

impl Model {
    pub fn from_container(
        container: Arc<TensorContainer>,
        options: &LoadOptions,
    ) -> ModelResult<Self> {
        let start = Instant::now();
        let metadata = container.metadata();

        let descriptor = resolve_architecture(metadata)?;
        let config = ModelConfiguration::from_metadata(metadata, &descriptor)?
            .with_max_context(options.max_context);
        let weights = WeightSet::from_container(&container, &config, &descriptor)?;
        let vocabulary = Vocabulary::from_metadata(metadata);
        if !vocabulary.is_empty() && vocabulary.len() != config.vocab_size {
            log::warn!(
                "Token table has {} entries but vocab_size is {}",
                vocabulary.len(),
                config.vocab_size
            );
        }

        log::info!(
            "Loaded {} model: dim={} hidden={} layers={} heads={}/{} head_size={} vocab={} ctx={}",
            descriptor.tag,
            config.dim,
            config.hidden_dim,
            config.n_layers,
            config.n_heads,
            config.n_kv_heads,
            config.head_size,
            config.vocab_size,
            config.context_length
        );
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "[perf] model::load {:.3}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
        }

        Ok(Self {
            descriptor,
            config,
            weights: Arc::new(weights),
            vocabulary,
            container,
        })
    }

    /// Fresh per-session state sized for this model.
    pub fn new_state(&self) -> RuntimeState {
        RuntimeState::new(&self.config, &self.descriptor)
    }
}
