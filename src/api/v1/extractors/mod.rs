mod principal;

pub use principal::CurrentPrincipal;
