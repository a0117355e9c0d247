use std::sync::Arc;

/// Provider-native symbol discovered at runtime (e.g. "OANDA:XAU_USD")
pub type ProviderSymbol = Arc<str>;
