//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition (CRD) YAML for the
//! `Declaration` resource from its Rust type definition.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/declaration.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The generated CRD includes the OpenAPI schema, printer columns and the
//! status subresource.

use declaration_controller::crd::Declaration;
use kube::core::CustomResourceExt;

fn main() {
    let crd = Declaration::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the types in src/crd/ instead and regenerate");
            println!("#");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
