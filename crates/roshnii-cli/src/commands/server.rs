use anyhow::Result;
use colored::Colorize;

use super::Context;

pub async fn status(ctx: &Context) -> Result<()> {
    match ctx.client.health().await {
        Ok(health) if health.status == "ok" => {
            println!("{} {} is {}", "✓".green(), ctx.server.cyan(), "healthy".green());
        }
        Ok(health) => {
            println!(
                "{} {} reports status {}",
                "✗".red(),
                ctx.server.cyan(),
                health.status.red()
            );
        }
        Err(e) => {
            println!("{} {} is unreachable: {}", "✗".red(), ctx.server.cyan(), e);
        }
    }
    let session = if ctx.has_stored_session() {
        "stored".green()
    } else {
        "none".yellow()
    };
    println!("  {}: {} (profile \"{}\")", "Session".cyan(), session, ctx.profile);
    Ok(())
}
