//! Certify Engine
//!
//! Decides which certificate template governs each course, keeps every
//! course bound to at most one template, and serves the template store over
//! HTTP.

pub mod activation;
pub mod api;
pub mod assignment;
pub mod catalog;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod resolver;
pub mod service;
pub mod state;

pub use activation::{ActivationMode, ActivationPlan, ActivationReport, Revocation};
pub use api::{create_router, ActivateCoursesRequest, AppState};
pub use assignment::AssignmentTable;
pub use catalog::{RemovedTemplate, TemplateCatalog};
pub use config::{Config, RetryConfig, ServerConfig};
pub use eligibility::{CourseAvailability, Eligibility};
pub use error::{CertifyError, Result};
pub use lifecycle::{validate_fields, CreatedTemplate, DeletedTemplate, NewTemplate};
pub use memory::MemoryStore;
pub use resolver::{Resolution, ResolutionSource};
pub use service::CertificateService;
pub use state::{CertificateState, IntegrityIssue, StateSnapshot, SNAPSHOT_VERSION};
