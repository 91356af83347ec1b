// Property tests for export file names derived from arbitrary editor content.
use mathpad_capture::export::{FALLBACK_STEM, export_file_name, sanitize_filename};
use proptest::prelude::*;

const ILLEGAL: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn is_windows_device(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or("").to_ascii_lowercase();
    matches!(stem.as_str(), "con" | "prn" | "aux" | "nul")
        || ((stem.starts_with("com") || stem.starts_with("lpt"))
            && stem.len() == 4
            && stem.as_bytes()[3].is_ascii_digit())
}

#[test]
fn reference_example_is_cleaned() {
    let name = sanitize_filename("a/b\\c:*?\"<>|");
    assert!(!name.is_empty());
    assert!(!name.contains(ILLEGAL));
}

#[test]
fn traversal_attempts_stay_in_place() {
    assert_eq!(export_file_name("../../etc/passwd", "png"), "....etcpasswd.png");
    assert_eq!(export_file_name("..", "png"), format!("{}.png", FALLBACK_STEM));
}

proptest! {
    #[test]
    fn sanitized_names_are_always_safe(source in any::<String>()) {
        let name = sanitize_filename(&source);

        prop_assert!(!name.is_empty());
        prop_assert!(name.len() <= 255);
        prop_assert!(!name.contains(ILLEGAL));
        prop_assert!(!name.chars().any(|c| c.is_control()));
        prop_assert!(name != "." && name != "..");
        prop_assert!(!name.ends_with('.') && !name.ends_with(' '));
        prop_assert!(!is_windows_device(&name));
    }

    #[test]
    fn export_names_keep_extension_within_limit(source in "\\PC{0,400}") {
        let file = export_file_name(&source, "png");

        prop_assert!(file.ends_with(".png"));
        prop_assert!(file.len() <= 255);
        prop_assert!(file.len() > ".png".len());
        prop_assert!(!file.contains(ILLEGAL));
    }

    #[test]
    fn clean_latex_is_left_alone(source in "[a-z0-9^_+={}()\\[\\] -]{1,40}[a-z0-9]") {
        prop_assume!(!is_windows_device(&source));
        prop_assert_eq!(sanitize_filename(&source), source);
    }
}
