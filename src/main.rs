//! # 公式截图工具：命令行入口
//!
//! 本文件只负责参数解析、日志初始化与服务装配。
//! 截图与导出逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser};

use mathpad_capture::capture::SettleProfile;
use mathpad_capture::editor::{MathField, MathFieldOptions};
use mathpad_capture::error::AppError;
use mathpad_capture::export::{DirectorySink, SystemClipboard};
use mathpad_capture::notify::LogNotifier;
use mathpad_capture::raster::{Background, LayoutRasterizer};
use mathpad_capture::service::CaptureService;
use mathpad_capture::{dom::DocumentHandle, settings};

#[derive(Parser, Debug)]
#[command(name = "mathpad-capture")]
#[command(version, about = "Render a LaTeX expression to a high-resolution PNG")]
struct Cli {
    /// LaTeX source to render
    latex: String,

    /// Directory to save the PNG into (defaults to the settings file or the current directory)
    #[arg(long, short = 'o', value_name = "DIR")]
    out: Option<PathBuf>,

    /// Copy the image to the system clipboard
    #[arg(long, short = 'c', action = ArgAction::SetTrue)]
    clipboard: bool,

    /// Copy the LaTeX source as text instead of an image
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "clipboard")]
    copy_source: bool,

    /// Background: transparent, a color name, or #rrggbb[aa]
    #[arg(long, short = 'b', default_value = "transparent")]
    background: Background,

    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Settle profile (fast, balanced, patient)
    #[arg(long, short = 'p', value_name = "PROFILE")]
    profile: Option<String>,
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let settings = match &cli.config {
        Some(path) => settings::load_settings_or_default(path)?,
        None => settings::AppSettings::default(),
    };

    let mut capture_config = settings.capture.clone();
    if let Some(name) = &cli.profile {
        capture_config.apply_settle_profile(SettleProfile::from_str(name)?);
    }

    let out_dir = cli
        .out
        .clone()
        .or_else(|| settings.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let save_file = cli.out.is_some() || !(cli.clipboard || cli.copy_source);

    let service = CaptureService::new(
        capture_config,
        Arc::new(LayoutRasterizer::new()),
        Arc::new(SystemClipboard::new(settings.clipboard)),
        Arc::new(DirectorySink::new(out_dir)),
        Arc::new(LogNotifier),
    )?
    .with_background(cli.background);

    let doc = DocumentHandle::new();
    let body = doc.with(|d| d.body())?;
    let field = MathField::mount(&doc, body, MathFieldOptions::default())?;
    field.set_value(&cli.latex)?;

    if cli.copy_source {
        service.copy_source(&field).await?;
    }
    if cli.clipboard {
        service.copy_image(&field).await?;
    }
    if save_file {
        if let Some(path) = service.download_image(&field).await? {
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ 导出失败 [{}]: {}", err.code(), err);
            ExitCode::FAILURE
        }
    }
}
