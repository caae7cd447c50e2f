use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic when the `spinnaker-sdk` feature is
    // enabled. Without it the crate compiles to an empty library so the rest
    // of the workspace builds (in mock mode) on machines without the SDK.
    #[cfg(feature = "spinnaker-sdk")]
    {
        println!("cargo:rerun-if-env-changed=SPINNAKER_SDK_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = env::var("SPINNAKER_SDK_DIR").expect(
            "SPINNAKER_SDK_DIR environment variable must be set when the `spinnaker-sdk` feature is enabled.",
        );

        let sdk_include_path = PathBuf::from(&sdk_dir).join("include").join("spinc");

        // Allow SPINNAKER_LIB_DIR to override the default lib path.
        let sdk_lib_path = if let Ok(lib_dir) = env::var("SPINNAKER_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else {
            PathBuf::from(&sdk_dir).join("lib")
        };

        if !sdk_include_path.exists() {
            panic!(
                "Spinnaker SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: Spinnaker SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            // The whole SpinnakerC surface is prefixed `spin`.
            .allowlist_function("spin.*")
            .allowlist_type("spin.*")
            .allowlist_type("_spin.*")
            .allowlist_type("bool8_t")
            .allowlist_type("size_t")
            .allowlist_var("MAX_BUFF_LEN")
            .allowlist_var("True|False")
            .default_enum_style(bindgen::EnumVariation::Rust {
                non_exhaustive: false,
            })
            .generate()
            .expect("Unable to generate Spinnaker bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());
        println!("cargo:rustc-link-lib=SpinnakerC");
    }

    #[cfg(not(feature = "spinnaker-sdk"))]
    {
        // Dummy bindings so src/lib.rs compiles without the SDK present.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when the spinnaker-sdk feature is not enabled\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
