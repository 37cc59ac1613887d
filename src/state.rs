use crate::db::invocation_repository::InvocationRepository;
use crate::engine::HirePipeline;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub invocation_repo: Arc<dyn InvocationRepository>,
    pub pipeline: Arc<HirePipeline>,
}
