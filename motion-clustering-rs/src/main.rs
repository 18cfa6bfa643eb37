fn main() {
    motion_clustering::cli::run();
}
