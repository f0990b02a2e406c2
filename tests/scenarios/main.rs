//! Scenario-based tests for deployline, driven by the in-memory cloud

mod helpers;

mod demo_pipeline;
mod deploy_flow;
mod endpoint_discovery;
mod failure_handling;
mod load_time_validation;
mod redeploy;
