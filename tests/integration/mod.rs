//! Integration Tests Module
//!
//! End-to-end tests of the application layer: prompts resolved against a fake
//! mail client, sent through chat window workers to mock provider servers,
//! and their answers handed back to the compose collaborator.

// Shared fakes for the mail client collaborators
mod support;

// Orchestrator flows: reply, replace, length guard, missing selection
mod prompt_flow_test;

// Worker message protocol against live adapters
mod worker_protocol_test;

// Settings file driving the orchestrator
mod settings_test;
