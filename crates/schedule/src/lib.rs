//! Trading calendar gate and epoch scheduling.

pub mod calendar;
pub mod epoch;

pub use calendar::{nyse_holidays, Session, TradingCalendar};
pub use epoch::{
    round_down_to_bucket, round_to_interval, EpochCursor, EpochDecision, EpochScheduler,
    EpochWindow,
};
