use crate::app::command_support::{load_settings, map_migration_err};
use crate::migration::StepCatalog;
use crate::shared::serde_ext::format_duration_text;
use std::time::Duration;

pub fn cmd_profiles(args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: profiles".to_string());
    }
    let settings = load_settings()?;
    let catalog = StepCatalog::from_settings(&settings).map_err(map_migration_err)?;
    Ok(render_catalog(&catalog))
}

pub fn render_catalog(catalog: &StepCatalog) -> String {
    let mut lines = Vec::new();
    for (profile, steps) in catalog.profiles() {
        let total = steps
            .iter()
            .map(|step| step.estimated_duration)
            .sum::<Duration>();
        lines.push(format!(
            "profile={} steps={} estimated={}",
            profile,
            steps.len(),
            format_duration_text(total)
        ));
        for step in steps {
            lines.push(format!(
                "  {}. {} ({})",
                step.order,
                step.name,
                format_duration_text(step.estimated_duration)
            ));
        }
    }
    lines.join("\n")
}
