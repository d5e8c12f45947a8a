use super::CorrelateArgs;

pub fn run(args: &CorrelateArgs) -> i32 {
    let pulses = match args.drive() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return 2;
        }
    };
    let cfg = args.config();
    match aceqd_core::g2(args.t0, args.tend, args.tau0, args.tauend, &pulses, &cfg) {
        Ok(result) => super::emit_real("g2", &result, args.output.as_deref()),
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}
