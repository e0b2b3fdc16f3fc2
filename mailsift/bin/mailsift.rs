use std::{io::Write, path::Path};

use anyhow::Context;
use clap::Parser;
use mailsift::{
    MailsiftConfig,
    cli::{Cli, Commands, SendArgs, SmtpArgs, VerifyArgs},
    input, output,
};
use mailsift_campaign::{
    CampaignMessage, CampaignProgress, DEFAULT_GRACE, Dispatcher, SmtpTransport, Termination,
    Transport,
};
use mailsift_common::internal;
use mailsift_smtp::Attachment;
use mailsift_verify::Verifier;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailsift_common::logging::init();

    let cli = Cli::parse();
    let config = mailsift::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Verify(args) => verify(config, &args).await,
        Commands::Send(args) => send(config, args).await,
        Commands::TestConnection(args) => test_connection(config, &args).await,
    }
}

async fn verify(mut config: MailsiftConfig, args: &VerifyArgs) -> anyhow::Result<()> {
    args.apply(&mut config.verify);
    let addresses = input::parse_addresses(&input::read_source(args.input.as_deref())?);
    let verifier = Verifier::from_config(&config.verify);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let (progress, printer) = if args.progress {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!("{}", output::verify_progress_line(&event));
            }
        });
        (Some(tx), Some(printer))
    } else {
        (None, None)
    };

    let report = verifier.verify_batch(addresses, progress, cancel).await;
    interrupt.abort();
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    let report = report?;

    let mut stdout = std::io::stdout().lock();
    output::write_report(&mut stdout, &report, args.output, args.filter)?;
    stdout.flush()?;

    eprintln!("{}", report.summary());
    Ok(())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        internal!(level = WARN, "Interrupted, stopping");
        cancel.cancel();
    }
}

async fn send(mut config: MailsiftConfig, args: SendArgs) -> anyhow::Result<()> {
    args.smtp.apply(&mut config.campaign);

    let targets = input::parse_targets(&input::read_source(Some(args.targets.as_path()))?);
    let mut message = CampaignMessage::new(args.subject, read_template(&args.body_file)?);
    if let Some(html) = &args.html_file {
        message = message.with_html(read_template(html)?);
    }
    for path in &args.attachments {
        let attachment = Attachment::from_path(path)
            .await
            .with_context(|| format!("Failed to attach {}", path.display()))?;
        message = message.with_attachment(attachment);
    }

    let dispatcher = Dispatcher::smtp(config.campaign);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = dispatcher.send_campaign(targets, message, Some(tx))?;

    let interrupt = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_interrupt(interrupt.clone()));
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event @ CampaignProgress::Sent { .. }) => {
                    eprintln!("{}", output::campaign_progress_line(&event));
                }
                Some(CampaignProgress::Finished { .. }) | None => break,
            },
            () = interrupt.cancelled() => {
                interrupted = true;
                break;
            }
        }
    }

    watcher.abort();

    let report = if interrupted {
        match handle.cancel_and_wait(DEFAULT_GRACE).await {
            Termination::Stopped(report) => report,
            Termination::TimedOut(report) => {
                internal!(
                    level = WARN,
                    "Campaign did not stop within {DEFAULT_GRACE:?}, the message in flight was abandoned"
                );
                report
            }
        }
    } else {
        handle.join().await
    };

    let mut stdout = std::io::stdout().lock();
    for outcome in &report.outcomes {
        writeln!(stdout, "{}", serde_json::to_string(outcome)?)?;
    }
    stdout.flush()?;

    eprintln!(
        "{}",
        output::campaign_progress_line(&CampaignProgress::Finished {
            stats: report.stats
        })
    );
    Ok(())
}

async fn test_connection(mut config: MailsiftConfig, args: &SmtpArgs) -> anyhow::Result<()> {
    args.apply(&mut config.campaign);
    config.campaign.validate()?;

    let address = config.campaign.address();
    SmtpTransport::new(config.campaign)
        .test_connection()
        .await
        .with_context(|| format!("Connection to {address} failed"))?;

    println!("Connection to {address} succeeded");
    Ok(())
}

fn read_template(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
