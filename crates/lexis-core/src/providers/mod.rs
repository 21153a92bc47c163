//! Built-in providers.
//!
//! | Operation | Backend | Provider |
//! |-----------|---------|----------|
//! | sentiment | `lexicon` | [`LexiconSentiment`] |
//! | summary | `frequency` | [`FrequencySummarizer`] |
//! | summary | `lead` | [`LeadSummarizer`] |
//! | keywords | `frequency` | [`FrequencyKeywords`] |
//! | any | `remote:<name>` | [`RemoteProvider`] |

mod keywords;
mod lexicon;
mod remote;
mod summary;
pub mod text;

pub use keywords::FrequencyKeywords;
pub use lexicon::LexiconSentiment;
pub use remote::{RemoteEndpoint, RemoteProvider};
pub use summary::{FrequencySummarizer, LeadSummarizer};
