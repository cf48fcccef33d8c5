//! Input adapter: bus subscription feeding one pipeline node.

use crate::bridge::{BridgeError, VictronBridge};
use crate::bus::{BusListener, BusUpdate};
use crate::config::InputAdapterConfig;
use crate::control_plane::migration::MigrationOutcome;
use crate::control_plane::status_registry::{
    NodeStatusListener, StatusHandlerId, StatusListenerRegistry,
};
use crate::control_plane::subscription_registry::{SubscriptionHandle, SubscriptionRegistry};
use crate::data_plane::value_pipeline::ValuePipeline;
use crate::host::{ContextSink, PipelineNode};
use crate::observability::{events, fields};
use crate::routing::service_address::ServiceAddress;
use crate::runtime::migration_runtime::{spawn_delayed_migration, MigrationTask};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, Level};

const COMPONENT: &str = "input_adapter";

struct InputListener {
    address: ServiceAddress,
    pipeline: Mutex<ValuePipeline>,
    node: Arc<dyn PipelineNode>,
    context: Option<Arc<dyn ContextSink>>,
}

#[async_trait]
impl BusListener for InputListener {
    async fn on_update(&self, update: BusUpdate) {
        let processed = self
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(update);

        let delivery = match processed {
            Ok(delivery) => delivery,
            Err(reason) => {
                debug!(
                    event = events::INPUT_SUPPRESS,
                    component = COMPONENT,
                    service = self.address.service(),
                    path = self.address.path(),
                    reason = reason.as_str(),
                    "suppressed bus update"
                );
                return;
            }
        };

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::INPUT_FORWARD,
                component = COMPONENT,
                service = self.address.service(),
                path = self.address.path(),
                topic = delivery.message.topic.as_str(),
                value = fields::format_value(&delivery.message.payload).as_str(),
                "forwarding bus update"
            );
        }

        if let (Some(context), Some((key, value))) = (self.context.as_ref(), delivery.context) {
            context.put(&key, value);
        }
        self.node.send(delivery.message);
        if let Some(status) = delivery.status {
            self.node.status(status);
        }
    }
}

/// Subscribes one `(service, path)` on behalf of a pipeline node and forwards every
/// update that passes its value pipeline.
///
/// Legacy addresses carrying a `.N` instance suffix are re-bound to their canonical
/// key by a delayed migration started with the adapter.
pub struct InputAdapter {
    address: ServiceAddress,
    registry: Arc<SubscriptionRegistry>,
    status_registry: Arc<StatusListenerRegistry>,
    subscription: SubscriptionHandle,
    status_handler: StatusHandlerId,
    migration: Option<MigrationTask>,
}

impl InputAdapter {
    pub(crate) async fn start(
        bridge: &VictronBridge,
        config: InputAdapterConfig,
        node: Arc<dyn PipelineNode>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let address = ServiceAddress::parse(&config.service, &config.path);
        let options = bridge.options();
        let context = bridge.context_sink().filter(|_| options.context_store);

        let status_registry = bridge.status_registry().clone();
        let status_handler = status_registry.add_listener(
            Arc::new(NodeStatusListener::new(node.clone())),
            address.service(),
            address.path(),
        );

        let listener = Arc::new(InputListener {
            address: address.clone(),
            pipeline: Mutex::new(ValuePipeline::new(
                &config,
                &address,
                context.is_some(),
                options.show_values,
            )),
            node,
            context,
        });

        let registry = bridge.subscription_registry().clone();
        let subscription = match registry
            .subscribe(address.service(), address.path(), listener)
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                status_registry.remove_listener(status_handler);
                return Err(err.into());
            }
        };

        let migration = address.needs_migration().then(|| {
            spawn_delayed_migration(
                registry.clone(),
                address.clone(),
                options.migration_delay(),
            )
        });

        Ok(Self {
            address,
            registry,
            status_registry,
            subscription,
            status_handler,
            migration,
        })
    }

    pub fn address(&self) -> &ServiceAddress {
        &self.address
    }

    /// Registry key the adapter's listener is currently indexed under.
    pub fn current_key(&self) -> Option<String> {
        self.registry.key_of(self.subscription)
    }

    pub fn migration_pending(&self) -> bool {
        self.migration
            .as_ref()
            .is_some_and(|migration| !migration.is_finished())
    }

    /// Waits for the scheduled migration, if any, and returns its outcome.
    pub async fn wait_for_migration(&mut self) -> Option<MigrationOutcome> {
        match self.migration.take() {
            Some(migration) => migration.join().await,
            None => None,
        }
    }

    /// Cancels a migration still waiting out its delay (one already running is
    /// awaited), then releases the subscription and status listener.
    pub async fn close(mut self) {
        if let Some(migration) = self.migration.take() {
            migration.cancel().await;
        }
        self.registry.unsubscribe(self.subscription).await;
        self.status_registry.remove_listener(self.status_handler);
        debug!(
            event = events::ADAPTER_CLOSE,
            component = COMPONENT,
            service = self.address.service(),
            path = self.address.path(),
            "closed input adapter"
        );
    }
}
