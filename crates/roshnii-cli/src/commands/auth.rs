use anyhow::{Context as _, Result};
use colored::Colorize;
use roshnii_client::SessionState;

use super::Context;
use crate::cli::{LoginArgs, OutputFormat};
use crate::output::{print_error, print_success, print_user, print_warning};

pub async fn login(ctx: &Context, args: &LoginArgs) -> Result<()> {
    let session = ctx.client.session();
    let user = if args.dev {
        let email = args.email.as_deref().context("--email is required")?;
        let name = args
            .name
            .clone()
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
        session
            .dev_login(email, &name)
            .await
            .context("Development login failed")?
    } else if let Some(cookie) = &args.cookie {
        session
            .login_with_cookies(cookie)
            .await
            .context("Cookie login failed")?
    } else if let Some(token) = &args.token {
        session
            .login_with_token(token)
            .await
            .context("Token login failed")?
    } else {
        let url = session
            .begin_oauth_login()
            .await
            .context("Failed to get the sign-in URL")?;
        println!("Open this URL in a browser to sign in with Google:");
        println!("  {}", url.as_str().cyan());
        println!(
            "Then run: roshnii login --cookie '<Cookie header from {}>'",
            ctx.server
        );
        return Ok(());
    };

    print_success(&format!(
        "Logged in to {} as {} <{}>",
        ctx.server.cyan(),
        user.name.cyan(),
        user.email
    ));
    Ok(())
}

pub async fn logout(ctx: &Context) -> Result<()> {
    if !ctx.has_stored_session() {
        println!("No session stored for profile \"{}\"", ctx.profile);
        return Ok(());
    }
    let confirmed = ctx.client.session().logout().await;
    ctx.forget()?;
    if let Err(e) = confirmed {
        print_warning(&format!("Server did not confirm the logout: {e}"));
    }
    print_success("Logged out (session removed)");
    Ok(())
}

pub async fn whoami(ctx: &Context) -> Result<()> {
    if !ctx.has_stored_session() {
        print_error(&format!("Not logged in (profile: \"{}\")", ctx.profile));
        return Ok(());
    }
    match ctx.client.session().load().await? {
        SessionState::Authenticated(user) => {
            print_user(&user, ctx.format)?;
            if let (OutputFormat::Table, Some(stored)) = (ctx.format, ctx.stored_session()) {
                println!("{}: {}", "Profile".cyan(), ctx.profile);
                println!("{}: {}", "Server".cyan(), stored.server.cyan());
                println!("{}: {}", "Session".cyan(), stored.preview());
            }
        }
        state => print_error(&format!("Not logged in ({state})")),
    }
    Ok(())
}
