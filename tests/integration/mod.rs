//! Integration Tests Module
//!
//! End-to-end tests of the agent loop and the operation protocol, driven by a
//! scripted planner over the in-memory file system.

// Scripted planner and service wiring
mod support;

// Full loop scenarios: completion, duplicates, governor, admission, streaming
mod agent_loop_test;

// Codec into executor
mod protocol_test;
