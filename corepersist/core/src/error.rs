use corepersist_collection::error::CollectionError;
use corepersist_graph::error::GraphError;
use corepersist_pipeline::error::PipelineError;
use corepersist_storage::error::StorageError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("storage error")]
    Storage(#[from] StorageError),

    #[error("collection error")]
    Collection(#[from] CollectionError),

    #[error("graph error")]
    Graph(#[from] GraphError),

    #[error("pipeline error")]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to build the background pool")]
    #[diagnostic(help("check num_threads in the configuration"))]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_retryable(),
            Error::Collection(e) => e.is_retryable(),
            Error::Graph(e) => e.is_retryable(),
            Error::Pipeline(e) => e.is_retryable(),
            Error::ThreadPool(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
