//! Integration tests: scripted platform plus full-session simulations.

mod simulation;
