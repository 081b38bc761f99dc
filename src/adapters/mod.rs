// Adapters layer: concrete implementations for external systems (processes, exit).

pub mod process;
