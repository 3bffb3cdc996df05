pub mod authenticate;
pub mod search;

pub use authenticate::{AuthAction, AuthenticateInput, AuthenticateTool};
pub use search::{
    DateRange, ErrorResponse, SearchInput, SearchOutcome, SearchResult, SearchSource, SearchTool,
};
