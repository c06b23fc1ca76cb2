pub mod euroc;
