//! Cross-service saga orchestration for the API gateway.
//!
//! Where the domain orchestrators call in-process repositories, the
//! gateway coordinates remote services over HTTP: registration spans the
//! users and lawyers services, booking validates against both before
//! writing to the appointments service. Every remote write carries an
//! idempotency key derived from the saga id and step name so a retried
//! call cannot double-apply.

pub mod clients;
pub mod cross_service;
pub mod error;

pub use clients::{
    AppointmentsClient, HttpAppointmentsClient, HttpLawyersClient, HttpUsersClient,
    InMemoryAppointmentsClient, InMemoryLawyersClient, InMemoryUsersClient, LawyersClient,
    NewAppointment, NewLawyerProfile, NewUser, RemoteAppointment, RemoteLawyerProfile, RemoteUser,
    UsersClient,
};
pub use cross_service::{
    CrossServiceSaga, GatewayAppointmentRequest, GatewayRegistrationRequest,
    APPOINTMENT_SAGA_TYPE, REGISTRATION_SAGA_TYPE,
};
pub use error::{GatewayError, Result};
