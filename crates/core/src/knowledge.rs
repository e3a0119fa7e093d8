//! Hand-authored grounding text for the RM Traceability SaaS domain.

use std::fs;
use std::path::Path;

use tracing::error;

/// Refusal returned for out-of-scope turns and for model output that fails validation.
/// Never model-generated.
pub const FALLBACK_SENTENCE: &str = "Posso ajudar somente com o **RM Traceability SaaS** \
     (inventário, códigos, empresas…), mas estou à disposição! 😉";

pub const DEFAULT_SYSTEM_CONTEXT: &str = "Contexto default.";

pub const LANGUAGE_INSTRUCTION: &str =
    "⚠️ Responda em **português do Brasil** sem repetir a pergunta.";

pub const GROUNDED_ANSWER_INSTRUCTION: &str = "[Responda **apenas** com base nesses dados.]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Accent-free stem matched against the normalized utterance.
    pub keyword: &'static str,
    pub description: &'static str,
}

pub const SERVICE_INFO: &[ServiceInfo] = &[
    ServiceInfo {
        keyword: "inventario",
        description: "Inventário: Gerencie e visualize seu estoque. Acesse: /dashboard/codigos/inventory.",
    },
    ServiceInfo {
        keyword: "empresa",
        description: "Empresas: Gerencie empresas e usuários. Acesse: /dashboard/empresas.",
    },
    ServiceInfo {
        keyword: "movimenta",
        description: "Movimentar Produtos/Últimas Movimentações: Registre entradas e saídas e acompanhe alterações. Acesse: /dashboard/codigos/movements ou /dashboard/eventos.",
    },
    ServiceInfo {
        keyword: "usuario",
        description: "Usuários: Gerencie contas e permissões. Acesse: /dashboard/usuarios.",
    },
    ServiceInfo {
        keyword: "produto",
        description: "Produtos: Gerencie produtos da empresa. Acesse: /dashboard/recursos.",
    },
    ServiceInfo { keyword: "codigo", description: "Códigos: Gerencie QR Codes. Acesse: /dashboard/codigos." },
    ServiceInfo {
        keyword: "lote",
        description: "Geração de Lote: Gere múltiplos QR Codes de uma vez. Acesse: /dashboard/codigos/bulk-generate.",
    },
    ServiceInfo { keyword: "status", description: "Status: Gerencie Status do sistema. Acesse: /dashboard/status." },
    ServiceInfo {
        keyword: "rastre",
        description: "Mapa de Rastreio: Visualize a localização das movimentações. Acesse: /dashboard/rastreamento.",
    },
    ServiceInfo {
        keyword: "configura",
        description: "Configurações: Gerencie dados do usuário e da empresa. Acesse: /dashboard/configuracoes.",
    },
];

pub const FEW_SHOT_EXAMPLES: &str = "Usuário: Como acessar o inventário?\n\
Assistente: Para acessar o inventário no RM Traceability SaaS, navegue até '/dashboard/codigos/inventory'.\n\n\
Usuário: Como gerenciar empresas?\n\
Assistente: Para gerenciar empresas, acesse '/dashboard/empresas'.\n\n\
Usuário: Como registrar movimentação de produtos?\n\
Assistente: Para registrar movimentação de produtos, utilize '/dashboard/codigos/movements'.\n\n\
Usuário: Como gerar lote de QR Codes?\n\
Assistente: Acesse '/dashboard/codigos/bulk-generate', selecione produtos e defina quantidade.\n\n\
Usuário: Onde vejo o mapa de rastreamento?\n\
Assistente: Use '/dashboard/rastreamento' para visualizar o mapa das movimentações.\n\n\
Usuário: Como visualizar o status do sistema?\n\
Assistente: Vá em '/dashboard/status' para acompanhar o status.\n\n\
Usuário: Onde configuro meus dados?\n\
Assistente: Acesse '/dashboard/configuracoes' para gerenciar seu perfil e empresa.";

/// Service descriptions whose keyword appears in the already-normalized utterance.
pub fn service_info_for(normalized_utterance: &str) -> Vec<&'static str> {
    SERVICE_INFO
        .iter()
        .filter(|info| normalized_utterance.contains(info.keyword))
        .map(|info| info.description)
        .collect()
}

/// Reads the product-context document, falling back to a fixed placeholder when unreadable.
pub fn load_system_context(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        Ok(_) => DEFAULT_SYSTEM_CONTEXT.to_string(),
        Err(err) => {
            error!(
                event_name = "chat.context.load_failed",
                path = %path.display(),
                error = %err,
                "could not read system context document, using default context"
            );
            DEFAULT_SYSTEM_CONTEXT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{load_system_context, service_info_for, DEFAULT_SYSTEM_CONTEXT};

    #[test]
    fn service_snippets_follow_keywords_in_utterance() {
        let snippets = service_info_for("como gerar lote de qr codes e ver o status?");
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].contains("/dashboard/codigos/bulk-generate"));
        assert!(snippets[1].contains("/dashboard/status"));

        assert!(service_info_for("bom dia").is_empty());
    }

    #[test]
    fn accented_plural_forms_match_stems() {
        let snippets = service_info_for("onde vejo as movimentacoes das empresas");
        assert_eq!(snippets.len(), 2);
    }

    #[test]
    fn system_context_reads_file_and_trims() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("system_context.txt");
        fs::write(&path, "\n  RM Traceability SaaS: rastreabilidade de produtos.  \n").expect("write");

        assert_eq!(load_system_context(&path), "RM Traceability SaaS: rastreabilidade de produtos.");
    }

    #[test]
    fn missing_system_context_falls_back() {
        let dir = TempDir::new().expect("temp dir");
        let context = load_system_context(&dir.path().join("missing.txt"));
        assert_eq!(context, DEFAULT_SYSTEM_CONTEXT);
    }
}
