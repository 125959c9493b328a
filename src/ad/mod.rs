pub mod engine;
pub mod lifecycle;
pub mod static_engine;

pub use engine::{
    AdDecisionEngine, AdDescriptor, AdError, AdEvent, AdEventKind, AdsLoader, AdsManager,
    AdsRequest, DisplayContainer, EngineSink, Notification, ViewMode,
};
pub use lifecycle::{AdLifecycle, AdState, Flow, LifecycleError, LifecycleSettings};
pub use static_engine::{StaticAd, StaticAdEngine};
