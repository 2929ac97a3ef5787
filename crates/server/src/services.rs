//! Service graph assembly
//!
//! ```text
//! Settings ─► llm factory ─► inference / embeddings
//!          ─► stores (in-memory, Scylla flows when enabled)
//!          ─► classifier, extractor, resolver, merge, flow ─► MessagePipeline
//!                                 │                  │
//!                       embedding worker      expiry sweeper
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use contact_agent_agent::{
    ContactResolver, ConversationFlow, ConversationFlowConfig, EmbeddingJobQueue,
    EntityExtractor, IntentClassifier, IntentClassifierConfig, MergeEngine, MessagePipeline,
};
use contact_agent_config::Settings;
use contact_agent_core::{
    ContactStore, EmbeddingClient, MessagingClient, RegistrationFlowStore, TextInferenceClient,
    UserStore,
};
use contact_agent_persistence::{
    InMemoryContactStore, InMemoryRegistrationFlowStore, InMemoryUserStore, ScyllaConfig,
};
use contact_agent_text_processing::{NameNormalizer, PhoneNormalizer};

use crate::messenger::SimulatedMessenger;
use crate::ServerError;

/// How long shutdown waits for queued embeddings
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborators the pipeline is built on
pub struct Collaborators {
    pub inference: Arc<dyn TextInferenceClient>,
    pub embeddings: Option<Arc<dyn EmbeddingClient>>,
    pub contacts: Arc<dyn ContactStore>,
    pub users: Arc<dyn UserStore>,
    pub flows: Arc<dyn RegistrationFlowStore>,
    pub messenger: Arc<dyn MessagingClient>,
}

/// The running service graph and its background tasks
pub struct Services {
    pub pipeline: Arc<MessagePipeline>,
    embedding_worker: Option<JoinHandle<()>>,
    sweeper_shutdown: watch::Sender<bool>,
}

impl Services {
    /// Build every collaborator from settings, then assemble
    pub async fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        let inference = contact_agent_llm::create_inference_client(&settings.inference)
            .map_err(|e| ServerError::Startup(format!("inference client: {}", e)))?;
        let embeddings = contact_agent_llm::create_embedding_client(&settings.embeddings)
            .map_err(|e| ServerError::Startup(format!("embedding client: {}", e)))?;

        let collaborators = Collaborators {
            inference,
            embeddings,
            contacts: Arc::new(InMemoryContactStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            flows: flow_store(settings).await,
            messenger: Arc::new(SimulatedMessenger::default()),
        };

        Self::assemble(settings, collaborators)
    }

    /// Wire the pipeline and start background tasks. Must run inside a
    /// tokio runtime.
    pub fn assemble(settings: &Settings, c: Collaborators) -> Result<Self, ServerError> {
        let phones = PhoneNormalizer::new(settings.phone.default_country_code.clone())
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        let names = NameNormalizer::new(&settings.names.substitutions)
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        let call_timeout = settings.inference.call_timeout();

        let extractor = Arc::new(EntityExtractor::new(
            c.inference.clone(),
            phones.clone(),
            call_timeout,
        ));
        let classifier = IntentClassifier::new(
            c.inference.clone(),
            IntentClassifierConfig {
                timeout: call_timeout,
                ..Default::default()
            },
        );

        let mut resolver = ContactResolver::new(
            c.contacts.clone(),
            c.users.clone(),
            names,
            phones.clone(),
            settings.resolver.clone(),
        );
        let mut merge = MergeEngine::new(c.contacts.clone(), phones.clone());
        let mut embedding_worker = None;
        if let Some(embedder) = c.embeddings {
            resolver = resolver.with_embeddings(embedder.clone(), settings.embeddings.timeout());
            let (queue, handle) = EmbeddingJobQueue::spawn(
                embedder,
                c.contacts.clone(),
                settings.embeddings.queue_capacity,
                settings.embeddings.timeout(),
            );
            merge = merge.with_embedding_jobs(queue);
            embedding_worker = Some(handle);
        }

        let flow = Arc::new(ConversationFlow::new(
            c.flows,
            c.users.clone(),
            c.messenger.clone(),
            extractor.clone(),
            phones.clone(),
            ConversationFlowConfig::from(&settings.flow),
        ));
        let sweeper_shutdown = flow.spawn_expiry_sweeper(settings.flow.sweep_interval());

        let pipeline = Arc::new(MessagePipeline::new(
            c.users,
            classifier,
            extractor,
            resolver,
            merge,
            flow,
            c.messenger,
            phones,
        ));

        tracing::info!(
            flow_mode = ?settings.flow.mode,
            semantic_search = embedding_worker.is_some(),
            "Message pipeline assembled"
        );

        Ok(Self {
            pipeline,
            embedding_worker,
            sweeper_shutdown,
        })
    }

    /// Stop the sweeper and let the embedding worker drain.
    ///
    /// Every other handle to the pipeline must be dropped first, otherwise
    /// the worker keeps waiting for jobs until the drain timeout.
    pub async fn shutdown(self) {
        let _ = self.sweeper_shutdown.send(true);
        drop(self.pipeline);

        if let Some(worker) = self.embedding_worker {
            match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await {
                Ok(_) => tracing::info!("Embedding worker drained"),
                Err(_) => tracing::warn!("Embedding worker did not drain in time"),
            }
        }
    }
}

async fn flow_store(settings: &Settings) -> Arc<dyn RegistrationFlowStore> {
    if !settings.persistence.enabled {
        tracing::info!("Persistence disabled, using in-memory registration flows");
        return Arc::new(InMemoryRegistrationFlowStore::new());
    }

    match contact_agent_persistence::init(ScyllaConfig::from(&settings.persistence)).await {
        Ok(store) => {
            tracing::info!(
                hosts = ?settings.persistence.scylla_hosts,
                keyspace = %settings.persistence.keyspace,
                "ScyllaDB registration flows initialized"
            );
            Arc::new(store)
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize ScyllaDB, falling back to in-memory");
            Arc::new(InMemoryRegistrationFlowStore::new())
        },
    }
}
