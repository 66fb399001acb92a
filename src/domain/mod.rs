//! Core domain types: identities, markets, quotes, histories, and
//! detected opportunities.

pub mod history;
pub mod ids;
pub mod market;
pub mod opportunity;
pub mod quote;

pub use history::{PriceHistory, PricePoint};
pub use ids::{AccountId, MarketId, OpportunityId};
pub use market::{Market, Outcome};
pub use opportunity::{Opportunity, OpportunityBuildError, OpportunityBuilder};
pub use quote::{Quote, QuoteCache};
