use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate n random template sources to compile in the benchmark.
pub fn generate_templates(n: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42); // Fixed seed for reproducibility
    let mut templates = Vec::with_capacity(n);

    for _ in 0..n {
        let mut source = String::from("<html><body>");
        let sections = rng.random_range(2..6);
        for section in 0..sections {
            let var = random_name(&mut rng);
            let list = random_name(&mut rng);
            match rng.random_range(0..4) {
                0 => source.push_str(&format!(
                    "<p condition=\"{var}\" content=\"{var}/label | 'none'\">fallback</p>",
                )),
                1 => source.push_str(&format!(
                    "<ul><li repeat=\"row {list}\" content=\"row/name\">x</li></ul>",
                )),
                2 => source.push_str(&format!(
                    "<div attributes=\"id {var}/id; class {var}/kind\">Hello ${{{var}/name}}</div>",
                )),
                _ => source.push_str(&format!(
                    "<section{once} if=\"{var}\"><span text=\"{var}\">s{section}</span></section>",
                    once = if rng.random_bool(0.3) { " once=\"\"" } else { "" },
                )),
            }
        }
        source.push_str("</body></html>");
        templates.push(source);
    }

    templates
}

/// Generate a random lowercase identifier.
fn random_name(rng: &mut StdRng) -> String {
    let charset = "abcdefghijklmnopqrstuvwxyz";
    let len = rng.random_range(3..=8);

    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset.chars().nth(idx).unwrap()
        })
        .collect()
}

// Print binary size information - can be used from individual benchmarks
pub fn print_binary_size() {
    let binary_path = std::env::current_exe().unwrap();
    let metadata = std::fs::metadata(binary_path.clone()).unwrap();
    let size_bytes = metadata.len();
    let size_kb = size_bytes as f64 / 1024.0;
    let size_mb = size_kb / 1024.0;

    println!(
        "Binary size: {:.2} MB ({:.2} KB, {} bytes)",
        size_mb, size_kb, size_bytes
    );
    println!("Binary path: {}", binary_path.display());
}
