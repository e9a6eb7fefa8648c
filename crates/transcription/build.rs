fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "google-stt")]
    {
        let fds = protox::compile(["proto/google_speech.proto"], ["proto/"])?;
        tonic_build::configure().build_server(false).compile_fds(fds)?;
    }
    Ok(())
}
