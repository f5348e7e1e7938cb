use std::fs;
use std::io::Write;
use std::path::Path;

use tinytemplate::TinyTemplate;
use tracing::info;

use crate::AppError;

pub const EXAMPLE_CONFIG: &str = include_str!("../config.yaml.example");
const UNIT_TEMPLATE: &str = include_str!("../systemd/rollcall-kiosk.service");

#[derive(serde::Serialize)]
struct UnitCtx<'a> {
    binary_path: &'a str,
    config_path: &'a str,
}

pub fn render_unit(binary_path: &Path, config_path: &Path) -> Result<String, AppError> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("unit", UNIT_TEMPLATE)
        .map_err(|e| AppError::Config(format!("template error: {e}")))?;
    let ctx = UnitCtx {
        binary_path: &binary_path.display().to_string(),
        config_path: &config_path.display().to_string(),
    };
    tt.render("unit", &ctx)
        .map_err(|e| AppError::Config(format!("render error: {e}")))
}

/// Writes the example config and the unit file, leaving existing files in
/// place unless `force` is set.
pub fn install_system(
    unit_path: &Path,
    config_path: &Path,
    binary_path: &Path,
    force: bool,
) -> Result<(), AppError> {
    for dir in [config_path.parent(), unit_path.parent()].into_iter().flatten() {
        fs::create_dir_all(dir)?;
    }

    if config_path.exists() && !force {
        eprintln!(
            "Config exists at {}; skipping (use --force to overwrite)",
            config_path.display()
        );
    } else {
        write_file(config_path, EXAMPLE_CONFIG)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(config_path, fs::Permissions::from_mode(0o640));
        }
        info!(path=%config_path.display(), "wrote config");
    }

    if unit_path.exists() && !force {
        eprintln!(
            "Unit exists at {}; skipping (use --force to overwrite)",
            unit_path.display()
        );
    } else {
        let unit = render_unit(binary_path, config_path)?;
        write_file(unit_path, &unit)?;
        info!(path=%unit_path.display(), "wrote unit");
    }

    println!(
        "Done. Edit {} (modem port, LED pins), then run: sudo systemctl daemon-reload && sudo systemctl enable --now rollcall-kiosk",
        config_path.display()
    );
    Ok(())
}

pub fn uninstall_system(
    unit_path: &Path,
    remove_config: bool,
    config_path: &Path,
) -> Result<(), AppError> {
    if unit_path.exists() {
        fs::remove_file(unit_path)?;
        println!("Removed unit {}", unit_path.display());
    } else {
        println!("Unit {} not found; skipping", unit_path.display());
    }
    if remove_config {
        if config_path.exists() {
            fs::remove_file(config_path)?;
            println!("Removed config {}", config_path.display());
        } else {
            println!("Config {} not found; skipping", config_path.display());
        }
    }
    println!("Run: sudo systemctl disable --now rollcall-kiosk && sudo systemctl daemon-reload");
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), AppError> {
    let mut f = fs::File::create(path)?;
    f.write_all(content.as_bytes())?;
    Ok(())
}
