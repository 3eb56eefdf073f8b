use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::StreamExt;
use glowscan_core::api::{ChatClient, ImagePart, ScanClient};
use glowscan_core::scheduler::{AlwaysOnline, HostProbe, NetworkMonitor, TOKEN_REFRESH_TASK};
use glowscan_core::utils::{format_remaining, truncate_string};
use glowscan_core::{
    CredentialKind, FeedPage, FeedPager, Item, ItemFilter, RefreshWorker, WorkRequest, WorkResult,
    WorkScheduler,
};
use tracing::{info, warn};

use crate::context::Context;
use crate::{Command, LoginArgs};

const DESCRIPTION_WIDTH: usize = 72;

pub async fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Register(args) => register(ctx, args).await,
        Command::Login(args) => login(ctx, args).await,
        Command::VerifyOtp { code } => verify_otp(ctx, &code).await,
        Command::ResendOtp => {
            ctx.gateway.resend_otp().await?;
            println!("A new code is on its way.");
            Ok(())
        }
        Command::Refresh => {
            ctx.gateway.refresh_token().await?;
            println!("Token refreshed.");
            Ok(())
        }
        Command::Status => {
            status(ctx);
            Ok(())
        }
        Command::Logout => {
            ctx.gateway.logout()?;
            println!("Logged out.");
            Ok(())
        }
        Command::Feed {
            page,
            size,
            kind,
            skin_type,
            all,
            json,
        } => {
            let filter = ItemFilter { kind, skin_type };
            let size = size.filter(|&s| s > 0).unwrap_or_else(|| ctx.config.page_size());
            feed(ctx, filter, page, size, all, json).await
        }
        Command::Analyze {
            front,
            left,
            right,
            json,
        } => {
            let front = ImagePart::from_path(&front).await?;
            let left = ImagePart::from_path(&left).await?;
            let right = ImagePart::from_path(&right).await?;
            let result = ScanClient::new(ctx.api.clone()).analyze(front, left, right).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Status: {}", result.status);
                match result.condition() {
                    Some(condition) => println!("Condition: {}", condition),
                    None => println!("No condition reported"),
                }
            }
            Ok(())
        }
        Command::Chat { message } => {
            let message = message.join(" ");
            if message.trim().is_empty() {
                bail!("Message is empty");
            }
            let reply = ChatClient::new(ctx.api.clone()).send(&message).await?;
            println!("{}", reply.response);
            Ok(())
        }
        Command::RefreshDaemon { delay_secs } => refresh_daemon(ctx, Duration::from_secs(delay_secs)).await,
    }
}

/// Email from the flag or the last login, password from the flag/env or a prompt.
fn credentials(ctx: &Context, args: LoginArgs) -> Result<(String, String)> {
    let email = match args.email.or_else(|| ctx.config.last_email.clone()) {
        Some(email) if !email.trim().is_empty() => email.trim().to_string(),
        _ => bail!("No email given - pass --email"),
    };
    let password = match args.password {
        Some(p) => p,
        None => rpassword::prompt_password(format!("Password for {}: ", email))?,
    };
    if password.is_empty() {
        bail!("Password is empty");
    }
    Ok((email, password))
}

fn remember_email(ctx: &Context, email: &str) {
    let mut config = ctx.config.clone();
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

async fn register(ctx: &Context, args: LoginArgs) -> Result<()> {
    let (email, password) = credentials(ctx, args)?;
    let session = ctx.gateway.register(&email, &password).await?;
    remember_email(ctx, &email);

    if session.verified {
        println!("Account created for {}.", email);
    } else {
        println!("Account created. Check {} for a code, then run `glowscan verify-otp <code>`.", email);
    }
    Ok(())
}

async fn login(ctx: &Context, args: LoginArgs) -> Result<()> {
    let (email, password) = credentials(ctx, args)?;
    ctx.gateway.login(&email, &password).await?;
    remember_email(ctx, &email);
    println!("Check {} for a code, then run `glowscan verify-otp <code>`.", email);
    Ok(())
}

async fn verify_otp(ctx: &Context, code: &str) -> Result<()> {
    let outcome = ctx.gateway.verify_otp(code.trim()).await?;
    if outcome.verified {
        println!("Verified. You are signed in.");
        Ok(())
    } else {
        bail!(
            "Code not accepted: {}",
            outcome.message.as_deref().unwrap_or("unknown reason")
        )
    }
}

fn status(ctx: &Context) {
    let profile = ctx.gateway.profile().snapshot();
    println!("Email:     {}", profile.email.as_deref().unwrap_or("-"));
    println!("Verified:  {}", if profile.verified { "yes" } else { "no" });
    for kind in [CredentialKind::Access, CredentialKind::Session] {
        let remaining = ctx
            .store
            .expires_in(kind)
            .map(format_remaining)
            .unwrap_or_else(|| "none".to_string());
        println!("{:<10} {}", format!("{}:", kind), remaining);
    }
    println!(
        "Signed in: {}",
        if ctx.gateway.is_logged_in() { "yes" } else { "no" }
    );
}

async fn feed(ctx: &Context, filter: ItemFilter, page: u32, size: u32, all: bool, json: bool) -> Result<()> {
    let mut pager = FeedPager::new(ctx.api.clone(), ctx.store.clone()).with_filter(filter);

    if !all {
        let page = pager.load(Some(page), size).await?;
        return print_page(&page, json);
    }

    let mut pages = Box::pin(pager.pages(size));
    while let Some(page) = pages.next().await {
        print_page(&page?, json)?;
    }
    Ok(())
}

fn print_page(page: &FeedPage, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(page)?);
        return Ok(());
    }

    println!("-- page {} ({} items) --", page.key, page.items.len());
    for item in &page.items {
        print_item(item);
    }
    if page.is_last() {
        println!("-- end of feed --");
    }
    Ok(())
}

fn print_item(item: &Item) {
    let tag = item
        .skin_type()
        .or_else(|| item.source())
        .map(|t| format!(" [{}]", t))
        .unwrap_or_default();
    println!("{:<8} {}{}", item.kind().as_str(), item.name, tag);
    if let Some(description) = &item.description {
        println!("         {}", truncate_string(description, DESCRIPTION_WIDTH));
    }
}

/// Refresh on a fixed delay until a refresh fails for good.
async fn refresh_daemon(ctx: &Context, delay: Duration) -> Result<()> {
    if !ctx.store.is_logged_in() {
        bail!("Not signed in - run `glowscan login` first");
    }

    let monitor: Arc<dyn NetworkMonitor> = match HostProbe::for_url(&ctx.api.endpoints().api_base_url) {
        Some(probe) => Arc::new(probe),
        None => Arc::new(AlwaysOnline),
    };
    let scheduler = WorkScheduler::new(monitor);
    let request = WorkRequest::default().with_initial_delay(delay);

    loop {
        scheduler.enqueue_unique(
            TOKEN_REFRESH_TASK,
            request.clone(),
            Arc::new(RefreshWorker::new(ctx.gateway.clone())),
        );
        println!("Next refresh in {}.", format_remaining(chrono::Duration::seconds(delay.as_secs() as i64)));

        match scheduler.join(TOKEN_REFRESH_TASK).await {
            Some(WorkResult::Success) => info!("Token refreshed"),
            Some(WorkResult::Retry) => warn!("Refresh kept failing, trying again next cycle"),
            Some(WorkResult::Failure) | None => {
                ctx.gateway.store().clear()?;
                bail!("Token refresh failed - run `glowscan login` to sign in again");
            }
        }
    }
}
