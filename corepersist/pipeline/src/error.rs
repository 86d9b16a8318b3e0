use corepersist_collection::error::CollectionError;
use corepersist_graph::error::GraphError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("collection error")]
    Collection(#[from] CollectionError),

    #[error("graph error")]
    Graph(#[from] GraphError),

    #[error("invalid cursor: {0}")]
    #[diagnostic(
        code(corepersist::pipeline::invalid_cursor),
        help("pass the cursor back exactly as it was returned")
    )]
    InvalidCursor(String),

    #[error("index error: {0}")]
    Index(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Collection(e) => e.is_retryable(),
            PipelineError::Graph(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
