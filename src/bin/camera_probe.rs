use posecast::camera::{CaptureSource, OpenCvBackend};
use posecast::config::Config;

const CONFIG_PATH: &str = "posecast.toml";

fn main() {
    let config = Config::load_or_default(CONFIG_PATH);
    let backend = OpenCvBackend::new(&config.capture);

    println!("=== カメラプローブ ===");
    println!(
        "requested {}x{} @ {}fps",
        config.capture.width, config.capture.height, config.capture.fps
    );
    println!();

    // enumerate は最初の欠番で止まるので、ここでは個別に開いて確認する
    let mut found = 0;
    for index in 0..config.capture.max_sources {
        print!("index {}: ", index);
        let mut camera = match backend.open_camera(index) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                break;
            }
        };
        found += 1;
        let (w, h) = camera.resolution();
        println!("{}x{} backend={}", w, h, camera.backend_name());

        match camera.read() {
            Ok(frame) => println!("       frame: {}x{} ({} bytes)", frame.width, frame.height, frame.data.len()),
            Err(e) => println!("       frame err: {}", e),
        }
        println!();
    }

    println!("{} source(s)", found);
}
