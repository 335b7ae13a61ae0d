//! Domain repository and notification traits with in-memory implementations.
//!
//! The saga layer treats the concrete stores as black boxes; these traits
//! are the narrow interface the orchestrators call. The in-memory
//! implementations back tests and the self-contained demo server, each with
//! fail toggles to exercise compensation paths.

pub mod appointments;
pub mod email;
pub mod lawyers;
pub mod users;
pub mod work_slots;

pub use appointments::{Appointment, AppointmentRepository, InMemoryAppointmentRepository};
pub use email::{EmailService, InMemoryEmailService};
pub use lawyers::{InMemoryLawyerProfileRepository, LawyerProfile, LawyerProfileRepository};
pub use users::{InMemoryUserRepository, User, UserRepository};
pub use work_slots::{InMemoryWorkSlotRepository, WorkSlot, WorkSlotRepository};
