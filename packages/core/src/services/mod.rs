//! Provider clients.

pub mod flight_service;
pub mod flights_sky;
pub mod google_flights;
pub mod http;
pub mod mock;

pub use flight_service::FlightServiceClient;
pub use flights_sky::FlightsSkyClient;
pub use google_flights::GoogleFlightsClient;
