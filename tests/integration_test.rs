use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use image_bridge::{Bridge, Command, InstallLayout, Outcome, Request, StatusWriter};

fn run(layout: &InstallLayout, request: &Request) -> (Outcome, Vec<String>) {
    let mut bridge = Bridge::new(layout.clone(), StatusWriter::new(Vec::new()));
    let outcome = bridge.run(request);
    let output = String::from_utf8(bridge.into_status().into_inner()).unwrap();
    (outcome, output.lines().map(str::to_string).collect())
}

fn upscale(model: &str) -> Command {
    Command::Upscale {
        model: model.to_string(),
    }
}

/// A failed run ends with exactly one ERROR line followed by one TRACEBACK line.
fn assert_failure_protocol(outcome: Outcome, events: &[String]) {
    assert_eq!(outcome, Outcome::Failure);
    assert_eq!(outcome.exit_code(), 1);

    let errors: Vec<_> = events.iter().filter(|e| e.starts_with("ERROR: ")).collect();
    let tracebacks: Vec<_> = events
        .iter()
        .filter(|e| e.starts_with("TRACEBACK: "))
        .collect();
    assert_eq!(errors.len(), 1, "events: {events:?}");
    assert_eq!(tracebacks.len(), 1, "events: {events:?}");

    let n = events.len();
    assert!(events[n - 2].starts_with("ERROR: "));
    assert!(events[n - 1].starts_with("TRACEBACK: "));
    assert!(!events.iter().any(|e| e == "SUCCESS"));
}

/// Installation with the upscale directory and one model pair in place.
fn install_models(root: &Path, models: &[&str]) {
    let models_dir = root.join("utils/upscale/models");
    fs::create_dir_all(&models_dir).unwrap();
    for model in models {
        fs::write(models_dir.join(format!("{model}.param")), b"7767517").unwrap();
        fs::write(models_dir.join(format!("{model}.bin")), b"weights").unwrap();
    }
}

#[test]
fn test_unknown_command_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    let layout = InstallLayout::new(temp_dir.path());
    let request = Request::new(
        Command::resolve("frobnicate", "realesrgan-x4plus", "png"),
        temp_dir.path().join("in.png"),
        temp_dir.path().join("out.png"),
    );

    let (outcome, events) = run(&layout, &request);
    assert_eq!(events, vec!["UNKNOWN_COMMAND"]);
    assert_eq!(outcome.exit_code(), 0);
}

#[test]
fn test_convert_success_sequence() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in.png");
    let output = temp_dir.path().join("out.webp");
    RgbImage::from_pixel(6, 6, Rgb([1, 2, 3])).save(&input).unwrap();

    let request = Request::new(Command::resolve("convert", "", "webp"), &input, &output);
    let (outcome, events) = run(&InstallLayout::new(temp_dir.path()), &request);

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        events,
        vec![
            "PROCESSING",
            "CONVERTING_IMAGE",
            "LOADING_IMAGE",
            "SAVING_AS_WEBP",
            "SUCCESS"
        ]
    );
    assert_eq!(image::open(&output).unwrap().dimensions(), (6, 6));
}

#[test]
fn test_convert_missing_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let request = Request::new(
        Command::resolve("convert", "", "jpg"),
        temp_dir.path().join("missing.png"),
        temp_dir.path().join("out.jpg"),
    );

    let (outcome, events) = run(&InstallLayout::new(temp_dir.path()), &request);
    assert_failure_protocol(outcome, &events);
    assert!(events.last().unwrap().starts_with("TRACEBACK: FileSystemError"));
}

#[test]
fn test_convert_to_svg_through_dispatcher() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in.png");
    let output = temp_dir.path().join("out.svg");
    RgbImage::from_pixel(10, 20, Rgb([90, 90, 90])).save(&input).unwrap();

    let request = Request::new(Command::resolve("convert", "", "svg"), &input, &output);
    let (outcome, events) = run(&InstallLayout::new(temp_dir.path()), &request);

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(events.first().unwrap(), "PROCESSING");
    assert_eq!(events.last().unwrap(), "SUCCESS");
    let document = fs::read_to_string(&output).unwrap();
    assert!(document.contains(r#"width="10" height="20""#));
}

#[test]
fn test_upscale_missing_model_files() {
    let temp_dir = TempDir::new().unwrap();
    let layout = InstallLayout::new(temp_dir.path());
    install_models(temp_dir.path(), &["realesrgan-x4plus"]);
    fs::write(layout.upscale_executable().unwrap(), b"").unwrap();

    let request = Request::new(
        upscale("realesrgan-x2plus"),
        temp_dir.path().join("in.png"),
        temp_dir.path().join("out.png"),
    );
    let (outcome, events) = run(&layout, &request);

    assert_failure_protocol(outcome, &events);
    assert_eq!(&events[..2], ["PROCESSING", "UPSCALING_STARTED"]);
    assert!(events[3].starts_with("TRACEBACK: ModelFilesNotFound"));
}

#[cfg(not(feature = "rembg"))]
#[test]
fn test_rembg_without_capability() {
    let temp_dir = TempDir::new().unwrap();
    let request = Request::new(
        Command::resolve("rembg", "", "png"),
        temp_dir.path().join("in.png"),
        temp_dir.path().join("out.png"),
    );

    let (outcome, events) = run(&InstallLayout::new(temp_dir.path()), &request);
    assert_failure_protocol(outcome, &events);
    assert!(events[2].contains("--features rembg"));
    assert!(events[3].starts_with("TRACEBACK: CapabilityUnavailable"));
}

#[cfg(unix)]
mod external_executable {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex;

    // Writing an executable while another thread forks can fail with ETXTBSY.
    static SPAWN_LOCK: Mutex<()> = Mutex::new(());

    fn install_script(layout: &InstallLayout, body: &str) {
        let path = layout.upscale_executable().unwrap();
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_non_zero_exit_reports_stderr() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp_dir.path());
        install_models(temp_dir.path(), &["realesrgan-x4plus"]);
        install_script(&layout, "echo 'vkCreateInstance failed' >&2\nexit 3");

        let input = temp_dir.path().join("in.png");
        RgbImage::new(4, 4).save(&input).unwrap();
        let request = Request::new(
            upscale("realesrgan-x4plus"),
            &input,
            temp_dir.path().join("out.png"),
        );
        let (outcome, events) = run(&layout, &request);

        assert_failure_protocol(outcome, &events);
        assert_eq!(
            &events[..4],
            [
                "PROCESSING",
                "UPSCALING_STARTED",
                "MODEL_SELECTED:realesrgan-x4plus",
                "EXECUTING_UPSCALE"
            ]
        );
        let error = &events[events.len() - 2];
        assert!(error.contains("exit code 3"), "{error}");
        assert!(error.contains("vkCreateInstance failed"), "{error}");
    }

    #[test]
    fn test_arguments_and_working_directory() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp_dir.path());
        install_models(temp_dir.path(), &["realesrgan-x2plus"]);
        // -i IN -o OUT -n NAME -s SCALE -f png
        install_script(
            &layout,
            r#"cp "$2" "$4"
echo "$*" > "$4.args"
pwd -P > "$4.cwd""#,
        );

        let input = temp_dir.path().join("in.png");
        let output = temp_dir.path().join("out.png");
        RgbImage::from_pixel(3, 3, Rgb([5, 6, 7])).save(&input).unwrap();

        let request = Request::new(upscale("realesrgan-x2plus"), &input, &output);
        let (outcome, events) = run(&layout, &request);

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            events,
            vec![
                "PROCESSING",
                "UPSCALING_STARTED",
                "MODEL_SELECTED:realesrgan-x2plus",
                "EXECUTING_UPSCALE",
                "UPSCALE_COMPLETE",
                "SAVING",
                "SUCCESS"
            ]
        );

        let args = fs::read_to_string(output.with_extension("png.args")).unwrap();
        assert!(args.trim_end().ends_with("-n realesrgan-x2plus -s 2 -f png"), "{args}");

        let cwd = fs::read_to_string(output.with_extension("png.cwd")).unwrap();
        assert_eq!(
            Path::new(cwd.trim_end()),
            fs::canonicalize(layout.models_dir()).unwrap()
        );
    }

    #[test]
    fn test_transparency_mismatch_is_reported() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp_dir.path());
        install_models(temp_dir.path(), &["realesrgan-x4plus"]);
        // A tool that "succeeds" without scaling leaves nothing to put the alpha on.
        install_script(&layout, r#"cp "$2" "$4""#);

        let input = temp_dir.path().join("in.png");
        RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 10])).save(&input).unwrap();
        let request = Request::new(
            upscale("realesrgan-x4plus"),
            &input,
            temp_dir.path().join("out.png"),
        );
        let (outcome, events) = run(&layout, &request);

        assert_failure_protocol(outcome, &events);
        assert!(events.contains(&"DETECTED_TRANSPARENT_IMAGE".to_string()));
        assert!(events.contains(&"RESTORING_TRANSPARENCY".to_string()));
        assert!(events.last().unwrap().starts_with("TRACEBACK: CodecError"));
    }
}
