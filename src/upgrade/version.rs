// file: src/upgrade/version.rs
// version: 1.0.0
// guid: 6b1f3e08-9a27-4c5d-8e60-d2a4f7c13b95

//! Version comparison and staged-image detection

/// Whether a device running `current` must be upgraded to reach `desired`.
///
/// Vendor version strings are compared as opaque tokens: `16.09.04` and
/// `16.9.4` are different versions here.
pub fn needs_upgrade(current: &str, desired: &str) -> bool {
    current != desired
}

/// Major component of a version string (`16` for `16.9.4`, `15` for `15.2(4)E8`)
pub fn major_component(version: &str) -> &str {
    version
        .trim()
        .split(|c: char| c == '.' || c == '(')
        .next()
        .unwrap_or_default()
}

/// Version tag embedded in an image filename: the two dot-separated fields
/// before the extension (`152-4.E8` for `c3750e-universalk9-tar.152-4.E8.tar`).
pub fn image_version_tag(image: &str) -> Option<String> {
    let file = image.rsplit(['/', ':']).next().unwrap_or(image);
    let parts: Vec<&str> = file.split('.').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(parts[parts.len() - 3..parts.len() - 1].join("."))
}

/// Whether the image referenced by `boot_path` carries the same version tag
/// as `upgrade_img`, meaning the device will boot the new software on reload.
pub fn boot_image_matches(boot_path: &str, upgrade_img: &str) -> bool {
    let boot_file = boot_path.rsplit('/').next().unwrap_or(boot_path);
    match (image_version_tag(boot_file), image_version_tag(upgrade_img)) {
        (Some(boot), Some(upgrade)) => boot == upgrade,
        _ => false,
    }
}
