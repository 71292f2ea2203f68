pub mod clock;
pub mod geoip;
pub mod handler;
pub mod metrics;
pub mod profile_db;
pub mod upstream;

pub use clock::{ClockPort, SystemClock};
pub use geoip::GeoIpPort;
pub use handler::{Handler, HandlerOutcome};
pub use metrics::{CoreMetricsPort, SpecialDomainClass};
pub use profile_db::ProfileDbPort;
pub use upstream::UpstreamHandlerPort;
