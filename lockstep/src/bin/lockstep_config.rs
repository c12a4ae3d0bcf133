use lockstep::EngineConfig;
use serdeconv;

fn main() {
    let config = serdeconv::to_toml_string(&EngineConfig::default()).expect("Failed to generate config file");

    println!("{}", config);
}
