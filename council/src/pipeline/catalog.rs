//! Default stage catalog: eight APK analysis dimensions plus a synthesis.
//!
//! Stages read extracted facts by key (see [`facts`]); a missing fact is
//! rendered as `unknown`. Stage 1 sends no context prefix, stages 2-8 send
//! the facts as JSON, and the synthesis stage sends the prior history.

use super::context::ExternalFacts;
use super::stage::{ContextSource, StageDefinition};

/// Fact keys read by the catalog
pub mod facts {
    pub const APK_PATH: &str = "apk_path";
    pub const PACKAGE_NAME: &str = "package_name";
    pub const VERSION_NAME: &str = "version_name";
    pub const VERSION_CODE: &str = "version_code";
    pub const MIN_SDK: &str = "min_sdk";
    pub const TARGET_SDK: &str = "target_sdk";
    pub const FILE_COUNT: &str = "file_count";
    pub const TOTAL_SIZE_MB: &str = "total_size_mb";
    pub const PERMISSIONS: &str = "permissions";
    pub const SIGNED: &str = "signed";
    pub const CERTIFICATES: &str = "certificates";
    pub const LAYOUT_COUNT: &str = "layout_count";
    pub const DRAWABLE_COUNT: &str = "drawable_count";
    pub const ASSET_FILES: &str = "asset_files";
    pub const DEX_COUNT: &str = "dex_count";
    pub const DEX_SIZE_MB: &str = "dex_size_mb";
    pub const DEX_FILES: &str = "dex_files";
    pub const ESTIMATED_METHODS: &str = "estimated_methods";
    pub const NATIVE_ARCHITECTURES: &str = "native_architectures";
    pub const NATIVE_LIBRARIES: &str = "native_libraries";
    pub const NATIVE_SIZE_MB: &str = "native_size_mb";
}

const UNKNOWN: &str = "unknown";

/// Permissions shown in full before the list is cut
const PERMISSION_LIMIT: usize = 20;

fn fact<'a>(f: &'a ExternalFacts, key: &str) -> &'a str {
    f.get_or(key, UNKNOWN)
}

/// Comma-separated fact rendered as a bulleted list
fn bullets(f: &ExternalFacts, key: &str, limit: usize) -> String {
    let items: Vec<&str> = f
        .get(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return format!("- {}", UNKNOWN);
    }
    let mut out: Vec<String> = items.iter().take(limit).map(|p| format!("- {}", p)).collect();
    if items.len() > limit {
        out.push(format!("...({} more)", items.len() - limit));
    }
    out.join("\n")
}

/// Share of the package taken by native code, when both sizes parse
fn native_share(f: &ExternalFacts) -> String {
    let parse = |key| f.get(key).and_then(|v| v.trim().parse::<f64>().ok());
    match (parse(facts::NATIVE_SIZE_MB), parse(facts::TOTAL_SIZE_MB)) {
        (Some(native), Some(total)) if total > 0.0 => format!("{:.1}%", native / total * 100.0),
        _ => UNKNOWN.to_string(),
    }
}

/// The nine-stage security analysis pipeline
pub fn security_analysis_stages() -> Vec<StageDefinition> {
    vec![
        structure_and_metadata(),
        static_code(),
        obfuscation_and_hardening(),
        dynamic_behavior(),
        native_code(),
        network_protocol(),
        signature_integrity(),
        anti_analysis(),
        StageDefinition::synthesis(9, "Security analysis summary expert", SYNTHESIS_INSTRUCTIONS),
    ]
}

fn structure_and_metadata() -> StageDefinition {
    StageDefinition::new(1, "APK structure and metadata expert", |_, f| {
        Ok(format!(
            "Analyse the composition and metadata of the following APK in depth.\n\n\
             [Basics]\n\
             - Path: {}\n\
             - Package: {}\n\
             - Version: {} ({})\n\
             - Min SDK: {}\n\
             - Target SDK: {}\n\n\
             [Files]\n\
             - Total files: {}\n\
             - DEX files: {}\n\
             - Native libraries: {}\n\
             - Total size: {} MB\n\n\
             [Permissions]\n{}\n\n\
             [Signature]\n\
             - Signed: {}\n\
             - Certificates: {}\n\n\
             [Resources]\n\
             - Layouts: {}\n\
             - Drawables: {}\n\
             - Assets: {}\n\n\
             Cover: manifest components and permission necessity, resources.arsc \
             organisation, multi-DEX strategy, native library purpose, signing scheme, \
             notable assets, and an overall estimate of scale and technology stack.\n\
             Provide a professional, detailed report.",
            fact(f, facts::APK_PATH),
            fact(f, facts::PACKAGE_NAME),
            fact(f, facts::VERSION_NAME),
            fact(f, facts::VERSION_CODE),
            fact(f, facts::MIN_SDK),
            fact(f, facts::TARGET_SDK),
            fact(f, facts::FILE_COUNT),
            fact(f, facts::DEX_COUNT),
            fact(f, facts::NATIVE_LIBRARIES)
                .split(',')
                .filter(|s| !s.trim().is_empty() && *s != UNKNOWN)
                .count(),
            fact(f, facts::TOTAL_SIZE_MB),
            bullets(f, facts::PERMISSIONS, PERMISSION_LIMIT),
            fact(f, facts::SIGNED),
            fact(f, facts::CERTIFICATES),
            fact(f, facts::LAYOUT_COUNT),
            fact(f, facts::DRAWABLE_COUNT),
            fact(f, facts::ASSET_FILES),
        ))
    })
    .with_context(ContextSource::None)
}

fn static_code() -> StageDefinition {
    StageDefinition::new(2, "Static code analysis expert", |_, f| {
        Ok(format!(
            "Perform a static code analysis from the APK's code layout.\n\n\
             [DEX]\n\
             - DEX files: {} ({})\n\
             - DEX size: {} MB\n\
             - Estimated methods: {}\n\n\
             [Native]\n\
             - Architectures: {}\n\
             - Native size: {} MB\n\n\
             Cover: single versus multi-DEX layout and the 64K method limit, \
             functional modules inferred from permissions, likely third-party SDKs \
             (ads, analytics, payments), sensitive source-to-sink data flows, \
             probable control flow between modules, library identification \
             (Retrofit, OkHttp, Gson and similar), and overall complexity.\n\
             Provide a detailed static analysis report.",
            fact(f, facts::DEX_COUNT),
            fact(f, facts::DEX_FILES),
            fact(f, facts::DEX_SIZE_MB),
            fact(f, facts::ESTIMATED_METHODS),
            fact(f, facts::NATIVE_ARCHITECTURES),
            fact(f, facts::NATIVE_SIZE_MB),
        ))
    })
}

fn obfuscation_and_hardening() -> StageDefinition {
    StageDefinition::new(3, "Obfuscation and hardening expert", |_, f| {
        Ok(format!(
            "Assess code obfuscation and hardening for package {}.\n\n\
             - DEX files: {}\n\
             - Native libraries: {}\n\
             - Assets: {}\n\n\
             Cover: identifier and control-flow obfuscation (ProGuard, R8, DexGuard), \
             string encryption, packers and shell protection (Jiagu, Bangcle, \
             Ijiami and similar), class loading tricks, resource protection, \
             and the resulting reverse-engineering difficulty.\n\
             Provide a detailed hardening assessment.",
            fact(f, facts::PACKAGE_NAME),
            fact(f, facts::DEX_FILES),
            fact(f, facts::NATIVE_LIBRARIES),
            fact(f, facts::ASSET_FILES),
        ))
    })
}

fn dynamic_behavior() -> StageDefinition {
    StageDefinition::new(4, "Dynamic behaviour analysis expert", |_, f| {
        Ok(format!(
            "Predict the runtime behaviour of package {}.\n\n\
             [Permissions]\n{}\n\n\
             Cover: startup sequence and component lifecycle, sensitive operations \
             (location, contacts, camera, microphone, storage), background services \
             and scheduled work, inter-process communication, dynamic code loading, \
             root or emulator detection, and privacy risks with their triggers.\n\
             Provide a detailed dynamic behaviour report.",
            fact(f, facts::PACKAGE_NAME),
            bullets(f, facts::PERMISSIONS, PERMISSION_LIMIT),
        ))
    })
}

fn native_code() -> StageDefinition {
    StageDefinition::new(5, "Native code analysis expert", |_, f| {
        Ok(format!(
            "Analyse the native layer of the APK.\n\n\
             - Architectures: {}\n\
             - Libraries: {}\n\
             - Native size: {} MB ({} of the package)\n\n\
             Cover: the likely purpose of each library, JNI boundaries and exported \
             symbols, native anti-debugging and integrity checks, cryptographic or \
             codec code, memory safety risks, and architecture coverage.\n\
             Provide a detailed native code report.",
            fact(f, facts::NATIVE_ARCHITECTURES),
            fact(f, facts::NATIVE_LIBRARIES),
            fact(f, facts::NATIVE_SIZE_MB),
            native_share(f),
        ))
    })
}

fn network_protocol() -> StageDefinition {
    StageDefinition::new(6, "Network protocol analysis expert", |_, f| {
        Ok(format!(
            "Analyse the network communication of package {}.\n\n\
             [Permissions]\n{}\n\n\
             Cover: HTTP stack and libraries, TLS configuration and certificate \
             pinning, network security config, API endpoint patterns, request \
             signing and encryption, push and long-lived connections, and data \
             leakage over the network.\n\
             Provide a detailed network protocol report.",
            fact(f, facts::PACKAGE_NAME),
            bullets(f, facts::PERMISSIONS, PERMISSION_LIMIT),
        ))
    })
}

fn signature_integrity() -> StageDefinition {
    StageDefinition::new(7, "Signature and integrity expert", |_, f| {
        Ok(format!(
            "Evaluate signing and integrity protection.\n\n\
             - Signed: {}\n\
             - Certificates: {}\n\
             - Target SDK: {}\n\n\
             Cover: signature scheme versions (v1 to v4), certificate chain and \
             validity, repackaging resistance, runtime signature verification, \
             update and installation integrity, and known signing weaknesses.\n\
             Provide a detailed integrity report.",
            fact(f, facts::SIGNED),
            fact(f, facts::CERTIFICATES),
            fact(f, facts::TARGET_SDK),
        ))
    })
}

fn anti_analysis() -> StageDefinition {
    StageDefinition::new(8, "Anti-analysis techniques expert", |_, f| {
        Ok(format!(
            "Identify anti-analysis techniques in package {}.\n\n\
             - Native libraries: {}\n\
             - DEX files: {}\n\n\
             Cover: debugger and tracer detection, Frida and Xposed hook detection, \
             emulator and root checks, timing checks, tamper responses, \
             environment fingerprinting, and practical bypass strategies for a \
             penetration test.\n\
             Provide a detailed anti-analysis report.",
            fact(f, facts::PACKAGE_NAME),
            fact(f, facts::NATIVE_LIBRARIES),
            fact(f, facts::DEX_FILES),
        ))
    })
}

const SYNTHESIS_INSTRUCTIONS: &str = "Include:\n\
1. Executive summary: application overview, key findings, risk level, core recommendations\n\
2. Technical architecture: overall design, technology stack, development quality\n\
3. Security posture: mechanisms in place, main risks, privacy, compliance\n\
4. Code protection: obfuscation and hardening, anti-debugging, reverse-engineering difficulty\n\
5. Runtime behaviour: sensitive operations and risk points\n\
6. Recommendations: hardening, privacy and compliance improvements\n\
7. Penetration test route: entry points, methods, tools, expected obstacles\n\
8. Score matrix (1-10): security, privacy, code quality, reverse-engineering difficulty, overall rating\n\
Produce a professional, thorough report.";
