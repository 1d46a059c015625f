pub mod service;

pub use service::{
    CreateUserOutcome, DeleteDeviceOutcome, NewUser, RegisterDeviceOutcome, RegistryService,
};
