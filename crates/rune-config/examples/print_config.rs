/// Example program to print the loaded configuration
///
/// Run with: cargo run -p rune-config --example print_config

fn main() {
    // Load configuration from settle.toml
    let config = rune_config::SettleConfig::load();

    println!("=== Settle Configuration ===\n");

    println!("Markers:");
    println!("  Animating: {}", config.markers.animating);
    println!("  Nested: {}", config.markers.nested);
    println!("  Bound: {}", config.markers.bound);
    println!();

    println!("Timing:");
    println!("  Safety Margin: {}ms", config.timing.safety_margin_ms);
    println!("  Step Limit: {}", config.timing.step_limit);
    println!();

    println!("Lifecycle:");
    println!("  Event: {}", config.lifecycle.event);
    println!();

    println!("Playback:");
    println!("  Dropped Animations: {:?}", config.playback.drop_animations);
    println!("  Duplicate Events: {}", config.playback.duplicate_events);
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}
