use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// Prebuilt static WebKit from oven-sh/WebKit releases
const WEBKIT_VERSION: &str = "aaf3f80b1cc701b412f8abfb7c7f413644a229ff";

fn main() {
    println!("cargo:rustc-check-cfg=cfg(has_bmalloc)");
    println!("cargo:rerun-if-env-changed=JSCORE_WEBKIT_VERSION");
    println!("cargo:rerun-if-env-changed=JSCORE_WEBKIT_DIR");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    match target_os.as_str() {
        "macos" | "ios" => link_system_framework(),
        "linux" => link_static_webkit("linux", linux_arch(&target_arch)),
        "windows" => {
            link_static_webkit("windows", windows_arch(&target_arch));
            link_windows_system_libs();
        }
        other => panic!("JavaScriptCore is not available for target OS {other}"),
    }
}

fn linux_arch(target_arch: &str) -> &'static str {
    match target_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => panic!("no prebuilt WebKit for linux/{other}"),
    }
}

fn windows_arch(target_arch: &str) -> &'static str {
    match target_arch {
        "x86_64" => "amd64",
        other => panic!("no prebuilt WebKit for windows/{other}"),
    }
}

fn link_system_framework() {
    println!("cargo:rustc-link-lib=framework=JavaScriptCore");

    if let Ok(output) = std::process::Command::new("xcrun")
        .args(["--show-sdk-path"])
        .output()
    {
        let sdk_path = String::from_utf8_lossy(&output.stdout);
        println!(
            "cargo:rustc-link-search=framework={}/System/Library/Frameworks",
            sdk_path.trim()
        );
    }
}

fn link_static_webkit(os: &str, arch: &str) {
    let webkit_dir = match env::var("JSCORE_WEBKIT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => fetch_webkit(os, arch),
    };

    let lib_dir = find_lib_dir(&webkit_dir);
    println!("cargo:rustc-link-search=native={}", lib_dir.display());

    println!("cargo:rustc-link-lib=static=JavaScriptCore");
    println!("cargo:rustc-link-lib=static=WTF");

    // Some Windows archives fold bmalloc into WTF
    if has_lib(&lib_dir, "bmalloc") {
        println!("cargo:rustc-link-lib=static=bmalloc");
        println!("cargo:rustc-cfg=has_bmalloc");
    }

    // ICU ships as icu* on Linux and sicu* on Windows
    if has_lib(&lib_dir, "icudata") {
        for lib in ["icudata", "icui18n", "icuuc"] {
            println!("cargo:rustc-link-lib=static={lib}");
        }
    } else if has_lib(&lib_dir, "sicudt") {
        for lib in ["sicudt", "sicuin", "sicuuc"] {
            println!("cargo:rustc-link-lib=static={lib}");
        }
    } else {
        println!(
            "cargo:warning=ICU libraries not found in {}",
            lib_dir.display()
        );
    }

    if os == "linux" {
        for lib in ["stdc++", "atomic", "dl", "pthread", "m"] {
            println!("cargo:rustc-link-lib={lib}");
        }
    }

    let include_dir = webkit_dir.join("include");
    if include_dir.exists() {
        println!("cargo:include={}", include_dir.display());
    }
}

fn link_windows_system_libs() {
    for lib in [
        "winmm", "bcrypt", "ntdll", "userenv", "dbghelp", "crypt32", "wsock32", "ws2_32",
        "advapi32", "ole32", "oleaut32", "uuid", "shell32",
    ] {
        println!("cargo:rustc-link-lib={lib}");
    }
    println!("cargo:rustc-link-arg=/NODEFAULTLIB:libcmt");
    println!("cargo:rustc-link-lib=msvcrt");
}

/// Download and unpack the archive once per version into the cargo cache.
fn fetch_webkit(os: &str, arch: &str) -> PathBuf {
    let version = env::var("JSCORE_WEBKIT_VERSION").unwrap_or_else(|_| WEBKIT_VERSION.to_string());
    let webkit_dir = cache_dir().join(&version).join(format!("{os}-{arch}"));

    let marker = webkit_dir.join(".downloaded");
    if marker.exists() {
        return webkit_dir;
    }

    let url = format!(
        "https://github.com/oven-sh/WebKit/releases/download/autobuild-{version}/bun-webkit-{os}-{arch}.tar.gz"
    );
    println!("cargo:warning=Downloading WebKit from {url}");

    fs::create_dir_all(&webkit_dir)
        .unwrap_or_else(|e| panic!("cannot create {}: {e}", webkit_dir.display()));

    let response = ureq::get(&url)
        .call()
        .unwrap_or_else(|e| panic!("failed to download {url}: {e}"));

    // Stream straight into the decoder
    let reader = response.into_body().into_reader();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(reader));
    archive
        .unpack(&webkit_dir)
        .unwrap_or_else(|e| panic!("failed to unpack WebKit archive: {e}"));

    fs::write(&marker, version).unwrap_or_else(|e| panic!("failed to write marker: {e}"));
    webkit_dir
}

fn find_lib_dir(webkit_dir: &Path) -> PathBuf {
    let direct = webkit_dir.join("lib");
    if direct.exists() {
        return direct;
    }

    // Archives usually unpack into a single top-level directory
    fs::read_dir(webkit_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path().join("lib"))
        .find(|lib| lib.exists())
        .unwrap_or_else(|| webkit_dir.to_path_buf())
}

fn has_lib(lib_dir: &Path, name: &str) -> bool {
    let unix_prefix = format!("lib{name}");
    fs::read_dir(lib_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .any(|file| {
            (file.starts_with(name) || file.starts_with(&unix_prefix))
                && (file.ends_with(".a") || file.ends_with(".lib"))
        })
}

fn cache_dir() -> PathBuf {
    if let Ok(cargo_home) = env::var("CARGO_HOME") {
        return PathBuf::from(cargo_home).join("cache").join("jscore-webkit");
    }

    for var in ["HOME", "USERPROFILE"] {
        if let Ok(home) = env::var(var) {
            return PathBuf::from(home)
                .join(".cargo")
                .join("cache")
                .join("jscore-webkit");
        }
    }

    PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| ".".into())).join("jscore-webkit")
}
