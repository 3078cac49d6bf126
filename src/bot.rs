/// bot.rs — Telegram front end: command replies, the status-message edit
/// flow, and the last-resort catch-all that guarantees the user always gets
/// a terminal reply.
use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use crate::downloader;
use crate::error::DownloadError;
use crate::recognize;
use crate::strategy::{ChainContext, DownloadRequest};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    Start,
    Help,
}

const WELCOME: &str = "👋 Hi! I'm your Video Downloader Bot!\n\n\
Send me a video link from:\n\
🎤 Smule\n\
📹 YouTube\n\
📸 Instagram\n\
🎵 TikTok\n\
🐦 Twitter\n\
👍 Facebook\n\n\
I'll download it and send it back to you!\n\n\
Just paste the link and I'll handle the rest 😊";

const HELP: &str = "🤖 How to use me:\n\n\
1. Copy a video link from any supported platform\n\
2. Paste it here\n\
3. Wait a few seconds\n\
4. Get your video!\n\n\
✅ Supported platforms:\n\
• Smule\n\
• YouTube\n\
• Instagram\n\
• TikTok\n\
• Twitter/X\n\
• Facebook\n\n\
⚠️ Note: Videos must be under 50MB";

pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_message),
        )
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
    let text = match cmd {
        Command::Start => WELCOME,
        Command::Help => HELP,
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, ctx: Arc<ChainContext>) -> ResponseResult<()> {
    let Some(text) = msg.text().map(str::to_owned) else {
        return Ok(());
    };
    let Some(user_id) = msg.from().map(|u| u.id.0) else {
        return Ok(());
    };
    info!(user = user_id, preview = %text.chars().take(50).collect::<String>(), "received message");

    if !recognize::is_supported(&text) {
        bot.send_message(
            msg.chat.id,
            "❌ Sorry, I couldn't recognize that link. Please send a valid video URL.",
        )
        .await?;
        return Ok(());
    }

    let url = recognize::extract_url(&text);
    info!(user = user_id, %url, "extracted URL");

    let status = bot
        .send_message(msg.chat.id, "⏳ Downloading your video...")
        .await?;

    if let Err(err) = serve_request(&bot, &msg, status.id, url, user_id, &ctx).await {
        // Last resort: whatever slipped through still ends in a reply.
        error!(user = user_id, error = %err, "unhandled failure");
        let _ = bot
            .edit_message_text(
                msg.chat.id,
                status.id,
                "❌ Something went wrong. Please try again later.",
            )
            .await;
    }
    Ok(())
}

async fn serve_request(
    bot: &Bot,
    msg: &Message,
    status_id: MessageId,
    url: String,
    user_id: u64,
    ctx: &ChainContext,
) -> anyhow::Result<()> {
    let req = DownloadRequest {
        source_url:   url,
        requester_id: user_id,
    };

    let path = match downloader::download_media(&req, ctx).await {
        Ok(path) => path,
        Err(err) => {
            warn!(user = user_id, error = %err, "download failed");
            bot.edit_message_text(msg.chat.id, status_id, outcome_text(&err))
                .await?;
            return Ok(());
        }
    };

    // Ship the file first; only a confirmed send counts as success.
    let sent = bot
        .send_video(msg.chat.id, InputFile::file(path.clone()))
        .supports_streaming(true)
        .await;
    if let Err(err) = sent {
        error!(user = user_id, error = %err, "failed to send video");
        bot.edit_message_text(msg.chat.id, status_id, "❌ Failed to send video. Please try again.")
            .await?;
        downloader::sweep_partials(&ctx.cfg.downloads_dir, user_id).await;
        return Ok(());
    }
    info!(user = user_id, "✅ video sent");

    if let Err(err) = bot
        .edit_message_text(msg.chat.id, status_id, "✅ Here's your video!")
        .await
    {
        // The video already went out; a stale status edit is not a failure.
        warn!(error = %err, "could not edit status message");
    }

    if let Err(err) = tokio::fs::remove_file(&path).await {
        error!(path = %path.display(), error = %err, "failed to delete sent file");
    }
    Ok(())
}

pub(crate) fn outcome_text(err: &DownloadError) -> String {
    match err {
        DownloadError::TooLarge { limit_mb } => {
            format!("❌ This video is too large (over {limit_mb}MB). Try a shorter video.")
        }
        DownloadError::Timeout => {
            "❌ Download took too long. The video might be too large or the connection is slow."
                .to_string()
        }
        DownloadError::InvalidUrl { platform } => {
            format!("❌ That doesn't look like a valid {platform} link.")
        }
        _ => "❌ Oops! I couldn't download this video. It might be private or unavailable."
            .to_string(),
    }
}
