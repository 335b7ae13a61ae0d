//! Saga orchestrators for the booking platform's domain workflows.
//!
//! Each orchestrator drives a fixed sequence of steps for one business
//! entity, persisting every state transition through the saga record store:
//!
//! - user registration: create user, send notification email
//! - lawyer profile creation/update: write profile, expand weekly
//!   availability into work slots
//! - appointment creation: create appointment, deactivate the booked work
//!   slot, send confirmation email
//!
//! When a step fails, previously completed steps are compensated in reverse
//! order. Compensations are best-effort: a failing compensation is logged
//! and recorded in the saga's data snapshot but does not stop the remaining
//! compensations or keep the saga from reaching the terminal `Failed` state.

pub mod appointments;
pub mod error;
pub mod lawyers;
pub mod repositories;
pub mod schedule;
pub mod snapshot;
pub mod users;

pub use appointments::{AppointmentRequest, AppointmentSaga, AppointmentSagaState};
pub use error::{OrchestrationError, Result};
pub use lawyers::{LawyerProfilePayload, LawyerSaga, LawyerSagaState};
pub use repositories::{
    Appointment, AppointmentRepository, EmailService, InMemoryAppointmentRepository,
    InMemoryEmailService, InMemoryLawyerProfileRepository, InMemoryUserRepository,
    InMemoryWorkSlotRepository, LawyerProfile, LawyerProfileRepository, User, UserRepository,
    WorkSlot, WorkSlotRepository,
};
pub use snapshot::CompensationOutcome;
pub use users::{RegistrationRequest, UserRegistrationSaga, UserSagaState};
