fn main() {
    #[cfg(feature = "bundled")]
    bundled();
}

/// Compiles the C shim and links OpenCV into the binary.
#[cfg(feature = "bundled")]
fn bundled() {
    println!("cargo:rerun-if-changed=csrc/dnn.cpp");
    println!("cargo:rerun-if-changed=csrc/dnn.h");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");

    let include_paths = std::env::var("OPENCV_INCLUDE_PATHS")
        .unwrap_or_else(|_| "/opt/homebrew/include/opencv4:/usr/local/include/opencv4:/usr/include/opencv4".into());
    let link_paths = std::env::var("OPENCV_LINK_PATHS")
        .unwrap_or_else(|_| "/opt/homebrew/lib:/usr/local/lib".into());

    let mut build = cc::Build::new();
    build.cpp(true).flag_if_supported("-std=c++11").file("csrc/dnn.cpp").include("csrc");
    for path in include_paths.split(':').filter(|p| !p.is_empty()) {
        build.include(path);
    }
    build.compile("giztoy_dnn");

    for path in link_paths.split(':').filter(|p| !p.is_empty()) {
        println!("cargo:rustc-link-search=native={path}");
    }
    for lib in ["opencv_dnn", "opencv_imgcodecs", "opencv_imgproc", "opencv_core"] {
        println!("cargo:rustc-link-lib={lib}");
    }
}
