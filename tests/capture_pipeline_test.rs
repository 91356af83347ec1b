// End-to-end tests for the capture coordinator running against the in-memory widget.
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mathpad_capture::capture::{
    CaptureConfig, CaptureCoordinator, CaptureError, CaptureTarget, OverlapPolicy, TARGET_DPI,
    BASELINE_DPI,
};
use mathpad_capture::dom::{DocumentHandle, NodeId};
use mathpad_capture::editor::{EditorHandle, MathField, MathFieldOptions};
use mathpad_capture::raster::{
    Background, Bitmap, LayoutRasterizer, RasterError, RasterOptions, Rasterizer,
};

fn test_config() -> CaptureConfig {
    CaptureConfig {
        post_blur_settle_ms: 40,
        clone_settle_ms: 300,
        raster_timeout_ms: 5_000,
        ..CaptureConfig::default()
    }
}

fn coordinator_with(config: CaptureConfig, rasterizer: Arc<dyn Rasterizer>) -> CaptureCoordinator {
    CaptureCoordinator::new(config, rasterizer).expect("coordinator init failed")
}

fn coordinator() -> CaptureCoordinator {
    coordinator_with(test_config(), Arc::new(LayoutRasterizer::new()))
}

async fn mounted(latex: &str, options: MathFieldOptions) -> (DocumentHandle, MathField) {
    let doc = DocumentHandle::new();
    let body = doc.with(|d| d.body()).expect("document lock");
    let field = MathField::mount(&doc, body, options).expect("mount failed");
    field.set_value(latex).expect("set_value failed");
    // let the initial live render flush
    tokio::time::sleep(Duration::from_millis(60)).await;
    (doc, field)
}

fn dom_state(doc: &DocumentHandle) -> (usize, Vec<NodeId>) {
    doc.with(|d| (d.node_count(), d.children(d.body()).to_vec()))
        .expect("document lock")
}

struct StallingRasterizer;

#[async_trait]
impl Rasterizer for StallingRasterizer {
    async fn rasterize(&self, _: &DocumentHandle, _: NodeId, _: &RasterOptions) -> Result<Bitmap, RasterError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(RasterError::Paint("unreachable".to_string()))
    }
}

struct FailingRasterizer;

#[async_trait]
impl Rasterizer for FailingRasterizer {
    async fn rasterize(&self, _: &DocumentHandle, _: NodeId, _: &RasterOptions) -> Result<Bitmap, RasterError> {
        Err(RasterError::Paint("unsupported content".to_string()))
    }
}

#[tokio::test]
async fn white_capture_is_scaled_to_300_dpi() {
    let (_doc, field) = mounted("x^2+1", MathFieldOptions::default()).await;
    let white: Background = "white".parse().unwrap();

    let snapshot = coordinator().capture(&field, white).await.expect("capture failed");
    let bitmap = &snapshot.bitmap;
    let (css_w, css_h) = bitmap.css_size();

    assert_eq!(snapshot.target, CaptureTarget::InnerContent);
    assert!(bitmap.width() > 0 && bitmap.height() > 0);
    let expected = TARGET_DPI / BASELINE_DPI;
    assert!((bitmap.width() as f32 / css_w - expected).abs() <= 1.0 / css_w + 1e-4);
    assert!((bitmap.height() as f32 / css_h - expected).abs() <= 1.0 / css_h + 1e-4);
    assert!((bitmap.scale() - expected).abs() < 1e-6);

    // content node: five glyphs of 9.6px plus 2px padding on each side
    assert!((css_w - 52.0).abs() < 1e-3);
    assert!((css_h - 24.0).abs() < 1e-3);
    assert_eq!(bitmap.pixel(0, 0), Some([255, 255, 255, 255]));
}

#[tokio::test]
async fn transparent_background_leaves_padding_clear() {
    let (_doc, field) = mounted("y", MathFieldOptions::default()).await;
    let snapshot = coordinator()
        .capture(&field, Background::Transparent)
        .await
        .expect("capture failed");
    assert_eq!(snapshot.bitmap.pixel(0, 0), Some([0, 0, 0, 0]));
}

#[tokio::test]
async fn capture_never_leaks_clone_on_success() {
    let (doc, field) = mounted("x^2+1", MathFieldOptions::default()).await;
    let before = dom_state(&doc);

    coordinator()
        .capture(&field, Background::Transparent)
        .await
        .expect("capture failed");
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn capture_leaves_live_widget_intact() {
    let (doc, field) = mounted("\\sqrt{2}", MathFieldOptions::default()).await;
    field.focus();
    let host = field.root().unwrap();

    coordinator()
        .capture(&field, Background::Transparent)
        .await
        .expect("capture failed");

    assert_eq!(field.content(), "\\sqrt{2}");
    assert!(!field.is_focused());
    doc.with(|d| {
        assert_eq!(d.style(host, "width"), Some("100%"));
        assert!(d.is_connected(host));
    })
    .unwrap();
}

#[tokio::test]
async fn missing_widget_is_no_widget_and_creates_nothing() {
    let (doc, field) = mounted("x", MathFieldOptions::default()).await;
    field.unmount().unwrap();
    let before = dom_state(&doc);

    let result = coordinator().capture(&field, Background::Transparent).await;

    assert!(matches!(result, Err(CaptureError::NoWidget)));
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn widget_without_render_tree_falls_back_to_clone_root() {
    let (doc, field) = mounted(
        "x^2+1",
        MathFieldOptions {
            render_tree: false,
            ..MathFieldOptions::default()
        },
    )
    .await;
    let before = dom_state(&doc);

    let snapshot = coordinator()
        .capture(&field, Background::Transparent)
        .await
        .expect("fallback capture should still produce a bitmap");

    assert_eq!(snapshot.target, CaptureTarget::CloneRoot);
    // relaxed host: light text plus 4px padding, not the 1280px box width
    let (css_w, css_h) = snapshot.bitmap.css_size();
    assert!((css_w - 56.0).abs() < 1e-3);
    assert!((css_h - 28.0).abs() < 1e-3);
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn same_content_twice_yields_same_dimensions() {
    let (_doc, field) = mounted("\\frac{a}{b}", MathFieldOptions::default()).await;
    let coordinator = coordinator();

    let first = coordinator.capture(&field, Background::Transparent).await.unwrap();
    let second = coordinator.capture(&field, Background::Transparent).await.unwrap();

    assert_eq!(first.dimensions(), second.dimensions());
    assert_eq!(first.bitmap.as_rgba(), second.bitmap.as_rgba());
}

#[tokio::test]
async fn back_to_back_captures_clean_up_independently() {
    for policy in [OverlapPolicy::Queue, OverlapPolicy::Allow] {
        let (doc, field) = mounted("e^{i\\pi}", MathFieldOptions::default()).await;
        let before = dom_state(&doc);
        let coordinator = coordinator_with(
            CaptureConfig {
                overlap_policy: policy,
                ..test_config()
            },
            Arc::new(LayoutRasterizer::new()),
        );

        let (a, b) = tokio::join!(
            coordinator.capture(&field, Background::Transparent),
            coordinator.capture(&field, Background::Transparent),
        );
        let (a, b) = (a.expect("first capture"), b.expect("second capture"));

        assert_eq!(a.dimensions(), b.dimensions(), "policy={:?}", policy);
        assert_eq!(a.target, CaptureTarget::InnerContent);
        assert_eq!(b.target, CaptureTarget::InnerContent);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(dom_state(&doc), before, "policy={:?}", policy);
    }
}

#[tokio::test]
async fn reject_policy_reports_busy_for_overlapping_capture() {
    let (doc, field) = mounted("x", MathFieldOptions::default()).await;
    let before = dom_state(&doc);
    let coordinator = coordinator_with(
        CaptureConfig {
            overlap_policy: OverlapPolicy::Reject,
            ..test_config()
        },
        Arc::new(LayoutRasterizer::new()),
    );

    let (first, second) = tokio::join!(
        coordinator.capture(&field, Background::Transparent),
        coordinator.capture(&field, Background::Transparent),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(CaptureError::Busy(id)) if id == field.id()));
    assert!(!coordinator.in_flight(field.id()));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn content_change_after_invocation_does_not_affect_result() {
    let (_doc, field) = mounted("x^2+1", MathFieldOptions::default()).await;
    let coordinator = coordinator();

    let (snapshot, _) = tokio::join!(coordinator.capture(&field, Background::Transparent), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        field.set_value("changed!").unwrap();
    });
    let snapshot = snapshot.expect("capture failed");

    assert_eq!(snapshot.content, "x^2+1");
    let (css_w, _) = snapshot.bitmap.css_size();
    assert!((css_w - 52.0).abs() < 1e-3);
    assert_eq!(field.content(), "changed!");
}

#[tokio::test]
async fn content_change_after_invocation_does_not_reach_clone_root_fallback() {
    let options = MathFieldOptions {
        render_tree: false,
        ..MathFieldOptions::default()
    };
    let (_doc, field) = mounted("x", options).await;
    let coordinator = coordinator();
    let baseline = coordinator.capture(&field, Background::Transparent).await.unwrap();

    let (snapshot, _) = tokio::join!(coordinator.capture(&field, Background::Transparent), async {
        // lands inside the post-blur settle, before the clone is taken
        tokio::time::sleep(Duration::from_millis(10)).await;
        field.set_value("xxxxxxxxxx").unwrap();
    });
    let snapshot = snapshot.expect("capture failed");

    assert_eq!(snapshot.target, CaptureTarget::CloneRoot);
    assert_eq!(snapshot.content, "x");
    assert_eq!(snapshot.bitmap.css_size(), baseline.bitmap.css_size());
    let (css_w, css_h) = snapshot.bitmap.css_size();
    assert!((css_w - 17.6).abs() < 1e-3);
    assert!((css_h - 28.0).abs() < 1e-3);
    assert_eq!(field.content(), "xxxxxxxxxx");
}

#[tokio::test]
async fn clone_that_never_settles_falls_back_to_clone_root() {
    let (doc, field) = mounted(
        "x^2+1",
        MathFieldOptions {
            render_latency: Duration::from_millis(800),
            ..MathFieldOptions::default()
        },
    )
    .await;
    let before = dom_state(&doc);

    let snapshot = coordinator()
        .capture(&field, Background::Transparent)
        .await
        .expect("unsettled clone should still produce a bitmap");

    assert_eq!(snapshot.target, CaptureTarget::CloneRoot);
    assert_eq!(snapshot.content, "x^2+1");
    assert!(snapshot.bitmap.width() > 0 && snapshot.bitmap.height() > 0);
    // let the late clone render fire against the already freed clone
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn repeated_captures_reuse_document_slots() {
    let (doc, field) = mounted("\\sqrt{x}", MathFieldOptions::default()).await;
    let coordinator = coordinator();
    let slot_count = || doc.with(|d| d.slot_count()).unwrap();

    coordinator.capture(&field, Background::Transparent).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let warmed = slot_count();
    for _ in 0..5 {
        coordinator.capture(&field, Background::Transparent).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    assert_eq!(slot_count(), warmed);
}

#[tokio::test]
async fn stalled_rasterizer_times_out_and_cleans_up() {
    let (doc, field) = mounted("x", MathFieldOptions::default()).await;
    let before = dom_state(&doc);
    let coordinator = coordinator_with(
        CaptureConfig {
            raster_timeout_ms: 50,
            ..test_config()
        },
        Arc::new(StallingRasterizer),
    );

    let result = coordinator.capture(&field, Background::Transparent).await;

    match result {
        Err(err @ CaptureError::RenderTimeout { .. }) => {
            assert_eq!(err.stage(), "rasterize");
            assert_eq!(err.code(), "E_RENDER_TIMEOUT");
        }
        other => panic!("expected timeout, got {:?}", other.map(|s| s.dimensions())),
    }
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn rasterizer_failure_keeps_cause_and_cleans_up() {
    let (doc, field) = mounted("x", MathFieldOptions::default()).await;
    let before = dom_state(&doc);
    let coordinator = coordinator_with(test_config(), Arc::new(FailingRasterizer));

    let err = coordinator
        .capture(&field, Background::Transparent)
        .await
        .expect_err("rasterizer failure should surface");

    assert!(matches!(err, CaptureError::Rasterization(_)));
    assert!(err.source().unwrap().to_string().contains("unsupported content"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(dom_state(&doc), before);
}

#[tokio::test]
async fn settle_probe_shortens_post_blur_wait() {
    let (_doc, field) = mounted(
        "x",
        MathFieldOptions {
            expose_settle_probe: true,
            ..MathFieldOptions::default()
        },
    )
    .await;
    let coordinator = coordinator_with(
        CaptureConfig {
            post_blur_settle_ms: 2_000,
            ..test_config()
        },
        Arc::new(LayoutRasterizer::new()),
    );

    let snapshot = coordinator.capture(&field, Background::Transparent).await.unwrap();
    assert!(snapshot.timings.blur_settle < Duration::from_millis(1_000));
    assert_eq!(snapshot.target, CaptureTarget::InnerContent);
}
