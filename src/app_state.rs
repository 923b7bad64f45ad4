use crate::board::Board;
use std::sync::Arc;
use tera::Tera;

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<Board>,
    pub templates: Arc<Tera>,
}

impl AppState {
    pub fn new(board: Arc<Board>, templates: Tera) -> Self {
        Self {
            board,
            templates: Arc::new(templates),
        }
    }
}
