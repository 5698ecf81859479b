//! Property-based tests for session and engine state machines
