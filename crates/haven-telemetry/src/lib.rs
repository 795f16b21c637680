use serde::{Deserialize, Serialize};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Haven Telemetry Configuration
#[derive(Default, Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TelemetryConfig {
    /// Service name.
    pub name: String,
    /// Service log level.
    pub log_level: Option<String>,
    /// Service json log output.
    pub json_log: bool,
    /// Tokio console support.
    pub tokio_console: bool,
    /// Hierarchical log tracing.
    pub tree_trace: bool,
    /// Chrome tracing support.
    pub chrome_trace: bool,
    /// Jaeger tracing layer.
    pub jaeger_trace: bool,
}

/// Keeps file based layers alive. Drop it only when the process is exiting.
#[derive(Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "chrome")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

impl TelemetryConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log_level: None,
            json_log: false,
            tokio_console: false,
            tree_trace: false,
            chrome_trace: false,
            jaeger_trace: false,
        }
    }

    pub fn with_log_level(mut self, log_level: &str) -> Self {
        self.log_level = Some(log_level.to_owned());
        self
    }

    pub fn with_json_log(mut self, json_log: bool) -> Self {
        self.json_log = json_log;
        self
    }

    pub fn with_tree_trace(mut self, tree_trace: bool) -> Self {
        self.tree_trace = tree_trace;
        self
    }

    pub fn with_chrome_trace(mut self, chrome_trace: bool) -> Self {
        self.chrome_trace = chrome_trace;
        self
    }

    pub fn with_jaeger_trace(mut self, jaeger_trace: bool) -> Self {
        self.jaeger_trace = jaeger_trace;
        self
    }

    pub fn with_tokio_console(mut self, tokio_console: bool) -> Self {
        self.tokio_console = tokio_console;
        self
    }

    pub fn init(self) -> anyhow::Result<TelemetryGuard> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                self.log_level
                    .as_deref()
                    .unwrap_or("info")
                    .to_lowercase(),
            )
        });

        #[allow(unused_mut)]
        let mut guard = TelemetryGuard::default();
        let mut tracing_layers = vec![];

        #[cfg(feature = "tokio-console")]
        if self.tokio_console {
            tracing_layers.push(console_subscriber::spawn().boxed());
        }

        #[cfg(feature = "tracing-tree")]
        if self.tree_trace {
            let hierarchical_layer = tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true)
                .with_filter(env_filter)
                .boxed();
            tracing_layers.push(hierarchical_layer);
        } else {
            tracing_layers.push(fmt_layer(self.json_log, env_filter));
        }

        #[cfg(not(feature = "tracing-tree"))]
        tracing_layers.push(fmt_layer(self.json_log, env_filter));

        #[cfg(feature = "chrome")]
        if self.chrome_trace {
            let (chrome_layer, flush) = tracing_chrome::ChromeLayerBuilder::new().build();
            tracing_layers.push(chrome_layer.boxed());
            guard._chrome = Some(flush);
        }

        #[cfg(feature = "jaeger")]
        if self.jaeger_trace {
            let tracer = opentelemetry_jaeger::new_agent_pipeline()
                .with_service_name(&self.name)
                .install_batch(opentelemetry::runtime::Tokio)?;
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_layers.push(telemetry.boxed())
        }

        Registry::default()
            .with(tracing_layers)
            .with(ErrorLayer::default())
            .try_init()?;

        tracing::debug!("telemetry initialized for {}", self.name);
        Ok(guard)
    }

    pub fn teardown() {
        #[cfg(feature = "jaeger")]
        opentelemetry::global::shutdown_tracer_provider();
    }
}

fn fmt_layer(json: bool, filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync> {
    if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    }
}
