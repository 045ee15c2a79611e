// tests/property/main.rs

mod graph;
mod scheduler;
