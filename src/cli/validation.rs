use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.statuscodes.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --statuscodes '{raw}': {e}"))?;
    }
    if let Some(raw) = args.statuscodesblacklist.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --statuscodesblacklist '{raw}': {e}"))?;
    }
    for (flag, value) in [
        ("threads", args.threads),
        ("max-sockets", args.max_sockets),
        ("max-body-bytes", args.max_body_bytes),
    ] {
        if value == Some(0) {
            return Err(format!("invalid {flag}, expected positive integer"));
        }
    }
    for (flag, value) in [("wait-for", args.wait_for), ("read-for", args.read_for)] {
        if value == Some(0) {
            return Err(format!("invalid {flag}, expected at least one second"));
        }
    }
    if args.signatures.is_some() != args.signature_output.is_some() {
        return Err("--signatures and --os must be given together".to_string());
    }
    Ok(())
}
