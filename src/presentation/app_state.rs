// Application state for HTTP handlers
use crate::application::aggregation_service::AggregationService;
use crate::application::selection_store::SelectionService;

#[derive(Clone)]
pub struct AppState {
    pub aggregation_service: AggregationService,
    pub selection_service: SelectionService,
}
