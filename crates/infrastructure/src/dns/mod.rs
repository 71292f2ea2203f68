pub mod access;
pub mod android_metric;
pub mod device;
pub mod ecs_cache;
pub mod ecs_wire;
pub mod object_pool;
pub mod pipeline;
pub mod request_info;
pub mod rules;
pub mod special;

pub use ecs_cache::EcsAwareCache;
pub use pipeline::CorePipeline;
pub use rules::RuleIndex;
