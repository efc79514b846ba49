pub mod settings;

pub use settings::{
    DatabaseConfig, DebugConfig, OpenAiConfig, PdfPipelineConfig, QueryConfig, ServerConfig,
    Settings,
};
