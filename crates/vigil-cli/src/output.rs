use vigil_apply::{ApplyFailure, ApplyOutcome};
use vigil_common::{
    AiService, Assignment, GpuConfig, GpuDevice, PreviewResult, RestartStatus, ServiceHealth,
    ServiceHealthStatus,
};

fn gpu_label(idx: Option<u32>) -> String {
    match idx {
        Some(i) => format!("gpu{i}"),
        None => "-".to_string(),
    }
}

pub fn print_gpus(gpus: &[GpuDevice]) {
    println!("\n=== GPUs ===\n");
    if gpus.is_empty() {
        println!("No GPUs detected.");
        return;
    }
    println!(
        "{:<6} {:<20} {:>10} {:>10} {:>10} {:<6}",
        "Index", "Name", "Total MB", "Used MB", "Free MB", "CC"
    );
    println!("{:-<68}", "");
    for g in gpus {
        println!(
            "{:<6} {:<20} {:>10} {:>10} {:>10} {:<6}",
            g.index,
            g.name,
            g.vram_total_mb,
            g.vram_used_mb,
            g.vram_free_mb(),
            g.compute_capability.as_deref().unwrap_or("-")
        );
    }
    println!();
}

pub fn print_services(services: &[AiService]) {
    println!("\n=== Services ===\n");
    println!("{:<20} {:<25} {:>10}", "Name", "Display Name", "VRAM MB");
    println!("{:-<57}", "");
    for s in services {
        println!("{:<20} {:<25} {:>10}", s.name, s.display_name, s.vram_requirement_mb);
    }
    println!();
}

fn print_assignments(assignments: &[Assignment]) {
    println!("{:<20} {:<6} {:>14}", "Service", "GPU", "VRAM Override");
    println!("{:-<42}", "");
    for a in assignments {
        let budget = a
            .vram_budget_override
            .map(|mb| mb.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} {:<6} {:>14}", a.service, gpu_label(a.gpu_index), budget);
    }
}

pub fn print_config(cfg: &GpuConfig) {
    println!("\n=== GPU Config ===\n");
    println!("Strategy:   {}", cfg.strategy);
    match cfg.updated_at {
        Some(t) => println!("Updated at: {}", t.to_rfc3339()),
        None => println!("Updated at: never"),
    }
    println!();
    print_assignments(&cfg.assignments);
    println!();
}

pub fn print_statuses(statuses: &[ServiceHealthStatus]) {
    println!(
        "{:<20} {:<12} {:<10} {:<6} {:<10}",
        "Service", "Status", "Health", "GPU", "Restart"
    );
    println!("{:-<62}", "");
    for s in statuses {
        let health = match s.health {
            ServiceHealth::Healthy => "HEALTHY",
            ServiceHealth::Degraded => "DEGRADED",
            ServiceHealth::Unhealthy => "UNHEALTHY",
            ServiceHealth::Unknown => "UNKNOWN",
        };
        let restart = match s.restart_status {
            Some(RestartStatus::Pending) => "pending",
            Some(RestartStatus::Restarting) => "restarting",
            Some(RestartStatus::Failed) => "FAILED",
            Some(RestartStatus::Unknown) => "?",
            None => "-",
        };
        println!(
            "{:<20} {:<12} {:<10} {:<6} {:<10}",
            s.name,
            s.status,
            health,
            gpu_label(s.gpu_index),
            restart
        );
    }
}

/// Proposed assignments next to the persisted ones.
pub fn print_preview(preview: &PreviewResult, current: &[Assignment]) {
    println!("\n=== Preview: {} ===\n", preview.strategy);
    println!("{:<20} {:<8} {:<8}", "Service", "Current", "Proposed");
    println!("{:-<38}", "");
    for p in &preview.proposed_assignments {
        let now = current
            .iter()
            .find(|a| a.service == p.service)
            .and_then(|a| a.gpu_index);
        let marker = if now != p.gpu_index { " *" } else { "" };
        println!(
            "{:<20} {:<8} {:<8}{}",
            p.service,
            gpu_label(now),
            gpu_label(p.gpu_index),
            marker
        );
    }
    println!("\nNothing was changed. Use `vigil apply --strategy {}` to adopt it.\n", preview.strategy);
}

pub fn print_warnings(warnings: &[String]) {
    for w in warnings {
        eprintln!("! {w}");
    }
}

pub fn print_outcome(outcome: &ApplyOutcome) {
    let report = outcome.report();
    println!();
    match outcome {
        ApplyOutcome::Converged(_) => {
            println!(
                "✓ All services healthy after {} poll(s), {:.1}s",
                report.ticks,
                report.elapsed.as_secs_f64()
            );
        }
        ApplyOutcome::NotConverged { failure, .. } => match failure {
            ApplyFailure::Timeout { waited } => {
                eprintln!(
                    "✗ Services did not converge within {:.0}s",
                    waited.as_secs_f64()
                );
            }
            ApplyFailure::RestartFailed { services } => {
                eprintln!("✗ Restart failed: {}", services.join(", "));
            }
        },
    }
    if report.poll_errors > 0 {
        eprintln!("  ({} health poll(s) failed and were retried)", report.poll_errors);
    }
    if report.result.restarted_services.is_empty() {
        println!("No services needed a restart.");
    } else {
        println!("Restarted: {}", report.result.restarted_services.join(", "));
    }
    println!();
    print_statuses(&report.result.service_statuses);
    println!();
}
