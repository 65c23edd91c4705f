pub mod internal;

pub use internal::{
    ChatMessage, ChatRecord, ChatUser, Confidence, EventKind, Flag, Indicator, IndicatorKind,
    ProgressEvent, ProgressStatus, RunKey, ServerEvent, Summary, TIMESTAMP_FORMAT,
};
