// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmalloc validate` command - Validate configuration file.

use shmalloc_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let wait = &config.publication_wait;
            println!("✓ Configuration is valid");
            println!();
            println!("Allocator Settings:");
            println!("  Permissions:        {:04o}", config.permissions);
            println!();
            println!("Publication Wait:");
            println!("  Max Attempts:       {}", wait.max_attempts());
            println!("  Spin Yields:        {}", wait.spin_yields());
            println!("  Initial Backoff:    {:?}", wait.initial_backoff());
            println!("  Max Backoff:        {:?}", wait.max_backoff());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
