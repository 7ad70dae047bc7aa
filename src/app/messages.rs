use paperleaf_core::background::PaginationOutcome;
use paperleaf_core::input::ButtonEdge;

/// Everything the reader loop wakes up for.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    Edge(ButtonEdge),
    Pagination(PaginationOutcome),
    /// Ctrl+C or a quit command.
    Shutdown,
    InputClosed,
}
