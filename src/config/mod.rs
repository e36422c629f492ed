// ABOUTME: Configuration module for deployment-specific settings
// ABOUTME: Environment-variable driven; no configuration files in production
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

/// Environment-based configuration management
pub mod environment;

pub use environment::ServerConfig;
