//! Terminal output for analysis results and plans.

use colored::Colorize;

use crate::apps::ApplicationKind;
use crate::steps::{Analysis, UpgradeStep};

/// Print the analysis summary.
pub fn print_analysis(model_name: &str, analysis: &Analysis) {
    println!();
    println!("{}", "Cloud Analysis:".bold());
    println!("{}", "-".repeat(40));
    println!("  Model: {}", model_name.bold());

    let (principals, subordinates) = count_kinds(analysis);
    println!(
        "  Applications: {} principal(s), {} subordinate(s)",
        principals, subordinates
    );

    match analysis.current_release {
        Some(release) => println!(
            "  Current release: {} ({})",
            release.codename().cyan(),
            release.date()
        ),
        None => println!("  Current release: {}", "unknown".yellow()),
    }
    match analysis.target() {
        Some(target) => println!(
            "  Target release: {} ({})",
            target.codename().green(),
            target.date()
        ),
        None => println!("  Target release: {}", "none".yellow()),
    }
}

/// Print the plan as an indented tree; groups are highlighted.
pub fn print_plan(plan: &UpgradeStep) {
    println!();
    println!("{}", "Upgrade Plan:".bold());
    println!("{}", "-".repeat(40));
    print_step(plan, 0);
}

fn print_step(step: &UpgradeStep, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    if step.action.is_some() {
        println!("{}{} {}", indent, "•".dimmed(), step.description);
    } else {
        println!("{}{}", indent, step.description.cyan().bold());
    }
    for child in step.children() {
        print_step(child, depth + 1);
    }
}

fn count_kinds(analysis: &Analysis) -> (usize, usize) {
    analysis
        .apps
        .iter()
        .fold((0, 0), |(principals, subordinates), app| match app.kind() {
            ApplicationKind::Principal => (principals + 1, subordinates),
            ApplicationKind::Subordinate => (principals, subordinates + 1),
        })
}
