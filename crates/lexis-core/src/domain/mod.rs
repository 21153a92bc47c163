//! Request, parameter and result types shared by every component.

pub mod operation;
pub mod params;
pub mod request;
pub mod result;

pub use operation::Operation;
pub use params::{
    ParamValue, Params, DEFAULT_MIN_TERM_LEN, DEFAULT_SUMMARY_RATIO, DEFAULT_TOP_N,
    MAX_MIN_TERM_LEN, MAX_TOP_N,
};
pub use request::AnalysisRequest;
pub use result::{
    AnalysisPayload, AnalysisResult, KeywordResult, KeywordTerm, SentimentLabel, SentimentResult,
    SummaryResult,
};
