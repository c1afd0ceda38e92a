use anyhow::Result;

use memwatch_core::Config;

use super::run::build_rule;

pub fn run(config: &Config) -> Result<()> {
    let rule = build_rule(config)?;
    let thresholds = rule.thresholds();

    if let Some(path) = &config.path {
        println!("Config: {}", path.display());
    }
    println!("Restart rule is valid");
    print_threshold("proceed_tasks", thresholds.proceed_tasks.map(|n| n.to_string()));
    print_threshold(
        "elapsed_time",
        thresholds.elapsed_time.map(|d| format!("{}s", d.as_secs_f64())),
    );
    print_threshold(
        "extra_consumed_megabytes",
        thresholds.extra_consumed_megabytes.map(|mb| format!("{} MB", mb)),
    );
    print_threshold(
        "extra_consumed_memory_percent",
        thresholds
            .extra_consumed_memory_percent
            .map(|pct| format!("{}%", pct)),
    );
    println!(
        "  restart_behavior: {} (exit status {})",
        rule.restart_behavior(),
        rule.restart_behavior().exit_code()
    );
    println!("  pre-exit callbacks: {}", rule.callback_count());

    Ok(())
}

fn print_threshold(name: &str, value: Option<String>) {
    println!("  {}: {}", name, value.as_deref().unwrap_or("-"));
}
