//! Portal-side embedding of the Headlamp dashboard
//!
//! Readiness polling before the dashboard is shown, iframe source and
//! navigation message handling, and deep links into the dashboard.

mod error;
mod frame;
mod links;
mod readiness;

pub use error::{EmbedError, LinkError, ReadinessError};
pub use frame::{loading_page, EmbedFrame, NavigationMessage};
pub use links::{DashboardParameters, HeadlampLinkFormatter, LinkRequest, DEFAULT_HEADLAMP_ROUTE};
pub use readiness::{ReadinessPoller, DEFAULT_HEALTH_PATH};
